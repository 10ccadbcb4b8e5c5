//! CanvasSync CLI
//!
//! Offline tools for inspecting the canvas states a client persisted.
//!
//! # Commands
//!
//! - `list` - List stored canvases
//! - `inspect` - Display statistics for one canvas
//! - `dump-log` - Dump a canvas's transaction log
//! - `working` - Print the reconstructed working graph as JSON
//! - `verify` - Check log invariants

mod commands;

use clap::{Parser, Subcommand};
use commands::Format;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// CanvasSync command-line store tools.
#[derive(Parser)]
#[command(name = "canvas-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the canvas store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored canvases
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Display statistics for one canvas
    Inspect {
        /// Canvas ID
        canvas: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Dump a canvas's transaction log
    DumpLog {
        /// Canvas ID
        canvas: String,

        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Print the reconstructed working graph as JSON
    Working {
        /// Canvas ID
        canvas: String,
    },

    /// Check log invariants; exits non-zero on violations
    Verify {
        /// Canvas ID
        canvas: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::List { format } => {
            let path = cli.path.ok_or("Store path required for list")?;
            commands::list::run(&path, format)?;
        }
        Commands::Inspect { canvas, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &canvas, format)?;
        }
        Commands::DumpLog {
            canvas,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for dump-log")?;
            commands::dump_log::run(&path, &canvas, limit, format)?;
        }
        Commands::Working { canvas } => {
            let path = cli.path.ok_or("Store path required for working")?;
            commands::working::run(&path, &canvas)?;
        }
        Commands::Verify { canvas } => {
            let path = cli.path.ok_or("Store path required for verify")?;
            commands::verify::run(&path, &canvas)?;
        }
        Commands::Version => {
            println!("CanvasSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Sync engine v{}", canvas_sync_engine::VERSION);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_inspect_with_json_format() {
        let cli = Cli::parse_from([
            "canvas-sync",
            "--path",
            "/tmp/s",
            "inspect",
            "board",
            "-f",
            "json",
        ]);
        assert_eq!(cli.path, Some(PathBuf::from("/tmp/s")));
        match cli.command {
            Commands::Inspect { canvas, format } => {
                assert_eq!(canvas, "board");
                assert_eq!(format, Format::Json);
            }
            _ => panic!("expected inspect"),
        }
    }
}
