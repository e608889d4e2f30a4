// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! CLI module for sampling videos.
//!
//! This module contains the command-line interface logic, including argument parsing
//! and the `process` command implementation.

// Modules
/// CLI arguments.
pub mod args;

/// Processing command.
pub mod process;
