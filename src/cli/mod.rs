// CLI module for opus2taf
//
// Argument parsing, report formatting and the command implementations on
// top of the library.

pub mod commands;
pub mod config;
pub mod output;

pub use commands::ConvertArgs;
pub use config::{Commands, Config};
pub use output::OutputFormatter;
