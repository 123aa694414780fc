//! DCC (Direct Client-to-Client) chat side-channel.
//!
//! Offers arrive as CTCP `DCC CHAT` inside a PRIVMSG, are checked against
//! the configured masks, and turn into a [`chat::DccChat`] connection.

pub mod chat;
pub mod parser;
pub mod security;
