//! Command-line interface for locallm.

pub mod commands;

pub use commands::Cli;
