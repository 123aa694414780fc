//! DCC authorization.
//!
//! An offer is accepted only when the sender's full origin matches one of
//! the configured masks. Private, loopback and link-local addresses can be
//! refused on top of that.

use crate::config::DccConfig;
use crate::error::DccRefusal;
use std::net::IpAddr;
use wildmatch::WildMatch;

/// Check if an IP address is private/loopback.
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// Case-insensitive glob match supporting `*` and `?`.
pub fn mask_matches(mask: &str, origin: &str) -> bool {
    WildMatch::new(&mask.to_lowercase()).matches(&origin.to_lowercase())
}

/// Decide whether `origin` may open a DCC chat from `ip`.
pub fn authorize(config: &DccConfig, origin: &str, ip: &IpAddr) -> Result<(), DccRefusal> {
    if !config.allowed.iter().any(|mask| mask_matches(mask, origin)) {
        return Err(DccRefusal::Origin(origin.to_string()));
    }
    if config.reject_private_ips && is_private_ip(ip) {
        return Err(DccRefusal::PrivateAddress(*ip));
    }
    Ok(())
}
