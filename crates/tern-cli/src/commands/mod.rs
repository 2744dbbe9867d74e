//! Subcommand implementations

pub mod chat;
pub mod parse;
pub mod search;
