//! CLI tool for token-range row counting.
//!
//! Provides commands for:
//! - Inspecting how a count splits the token space
//! - Running a count against an in-memory table

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::CliConfig;
