//! Command implementations of the `mbe` binary
//!
//! Every command reads a TOML [`input::InputFile`] and returns its report as
//! a string; the binary only prints it.

pub mod commands;
pub mod input;

use std::path::Path;

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// Human-readable text
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Storage unit name for calls read from `path`
pub fn unit_name(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "input".to_string(), |stem| stem.to_string_lossy().into_owned())
}
