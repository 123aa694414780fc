//! Random bot nickname generator.
//!
//! Produces nicknames like `CrabBot417`, short enough for IRC's traditional
//! 9-character limit on most networks that still enforce it.

use rand::RngExt;

const STEMS: &[&str] = &["Crab", "Claw", "Reef", "Kelp", "Shell", "Tide"];

const SUFFIXES: &[&str] = &["Bot", "Bt", "B"];

/// Generate a random bot nickname like `CrabBot417`.
pub fn generate_nickname() -> String {
    let mut rng = rand::rng();
    let stem = STEMS[rng.random_range(0..STEMS.len())];
    let suffix = SUFFIXES[rng.random_range(0..SUFFIXES.len())];
    let num: u16 = rng.random_range(0..1000);
    format!("{}{}{}", stem, suffix, num)
}
