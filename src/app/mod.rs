//! Bot runtime: events, the dispatch core, the command table, the bus and
//! the outgoing delivery queue.

pub mod bus;
pub mod command;
pub mod event;
pub mod handler;
pub mod kernel;
pub mod output;
