//! CLI subcommand implementations.

pub mod config;
pub mod shadow;
pub mod sync;
