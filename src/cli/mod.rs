//! Headless command-line front end
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{default_output_path, main, run, Cli, ConsoleView};
