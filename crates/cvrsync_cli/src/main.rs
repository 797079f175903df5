//! cvrsync CLI
//!
//! Command-line tools for inspecting the sync protocol.
//!
//! # Commands
//!
//! - `replay` - Replay a scripted push/pull session against an in-process server
//! - `schema` - Print key paths and derived indexes of the fixture domain

mod commands;
mod error;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// cvrsync command-line tools.
#[derive(Parser)]
#[command(name = "cvrsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted push/pull session
    Replay {
        /// Path to the JSON script
        script: PathBuf,
    },

    /// Print key paths and derived indexes
    Schema,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay { script } => {
            let reports = commands::replay::run(&script)?;
            match cli.format {
                Format::Text => print!("{}", commands::replay::render_text(&reports)),
                Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            }
        }
        Commands::Schema => {
            let reports = commands::schema::run()?;
            match cli.format {
                Format::Text => print!("{}", commands::schema::render_text(&reports)),
                Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
            }
        }
        Commands::Version => {
            println!("cvrsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
