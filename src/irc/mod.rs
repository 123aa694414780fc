//! IRC transport: line I/O, protocol parsing and the connection state machine.

pub mod client;
pub mod connection;
pub mod parser;
pub mod wrap;
