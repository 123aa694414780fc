//! Typed failures for the bot engine.
//!
//! Transport and command faults never escape the dispatch path; these types
//! exist so the places that do surface them (logs, `getcmd`, DCC refusals)
//! can say precisely what went wrong.

use std::net::IpAddr;
use thiserror::Error;

/// A command module could not be loaded.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("no such command module: {0}")]
    Missing(String),

    #[error("command module {name} failed to load: {reason}")]
    Failed { name: String, reason: String },
}

/// A command function failed while running.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(String),

    #[error("command panicked: {0}")]
    Panicked(String),
}

/// Socket-level failures of a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

/// Why an inbound DCC CHAT offer was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DccRefusal {
    #[error("origin {0} is not allowed to open a DCC chat")]
    Origin(String),

    #[error("private/loopback address {0} rejected")]
    PrivateAddress(IpAddr),
}
