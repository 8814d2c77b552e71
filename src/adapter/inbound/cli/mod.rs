//! CLI module graph.

pub mod command;
pub mod market;
pub mod output;
pub mod trade;
pub mod venues;
pub mod watch;
