//! CLI layer for hexbot.
//!
//! Provides the command-line interface using clap, with commands for
//! running completion and chat bots and managing presets.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands, PresetCommands, SamplingArgs};
