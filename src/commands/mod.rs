//! Built-in command modules and the loader that serves them to the table.

pub mod basic;

use crate::app::command::{Loader, Module};
use crate::error::LoadError;

/// Loader for the modules compiled into the binary.
#[derive(Debug, Default)]
pub struct Builtin;

impl Loader for Builtin {
    fn manifest(&self) -> Vec<(String, String)> {
        basic::VERBS
            .iter()
            .map(|verb| (verb.to_string(), basic::NAME.to_string()))
            .collect()
    }

    fn load(&self, name: &str) -> Result<Module, LoadError> {
        match name {
            basic::NAME => Ok(basic::module()),
            other => Err(LoadError::Missing(other.to_string())),
        }
    }
}

pub fn loader() -> Builtin {
    Builtin
}
