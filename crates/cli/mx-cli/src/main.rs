//! `mbe`: declarative macro expansion from the command line
//!
//! Expands, walks and checks macro definitions described in TOML files.

#![allow(clippy::print_stdout, reason = "CLI tool prints its reports to stdout")]

use anyhow::Result;
use clap::{Parser, Subcommand};
use mx_cli::commands::{check, expand, walk};
use mx_cli::input::InputFile;
use mx_cli::{unit_name, Format};
use mx_driver::ExpansionConfig;
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mbe")]
#[command(about = "Declarative macro expansion engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Expansion settings (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand every call in the input file
    Expand {
        /// Input file
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Report fragment kinds reachable at each call's caret
    Walk {
        /// Input file
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Compile every definition and report unusable ones
    Check {
        /// Input file
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Expand { path, format } => {
            let input = InputFile::from_file(&path)?;
            print!("{}", expand::run(&input, &unit_name(&path), config, format)?);
        }
        Commands::Walk { path, format } => {
            let input = InputFile::from_file(&path)?;
            print!("{}", walk::run(&input, config, format)?);
        }
        Commands::Check { path, format } => {
            let input = InputFile::from_file(&path)?;
            let report = check::run(&input, format)?;
            print!("{}", report.text);
            if report.errors > 0 {
                anyhow::bail!("check failed with {} unusable definitions", report.errors);
            }
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ExpansionConfig> {
    path.map_or_else(|| Ok(ExpansionConfig::default()), ExpansionConfig::from_file)
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}
