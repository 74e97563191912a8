//! CLI subcommand implementations.

pub mod check;
pub mod diagnose;
pub mod read;
pub mod watch;
