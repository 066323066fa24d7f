//! Subcommand implementations.

pub mod config;
pub mod publish;
pub mod serve;
pub mod subscribe;
