//! # Flakes CLI Module
//!
//! ## Available Commands
//!
//! - `providers` - List registered serialization providers
//! - `selftest` - Round-trip every provider over the sample graph
//! - `save` - Build the sample graph and write it to a save-game file
//! - `inspect` - Validate a save-game file and print its header
//! - `load` - Rebuild the object in a save-game file and print its tree
//! - `config` - Print the effective configuration

mod commands;

use crate::config::FlakesConfig;
use clap::{Parser, Subcommand};
use flakes_core::harness::DEFAULT_CHILDREN;
use flakes_core::primitives::MAX_ARRAY_LENGTH;
use flakes_core::{FlakesError, ProviderRegistry};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Flakes - object graph snapshots
///
/// Captures an object graph as a self-describing flake and rebuilds an
/// independent copy from it.
#[derive(Parser, Debug)]
#[command(name = "flakes")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (debug logging, per-case details)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a flakes.toml configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Serialization provider (overrides the configuration)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered serialization providers
    Providers,

    /// Round-trip the sample graph through every provider
    ///
    /// With --provider, only that provider runs.
    Selftest {
        /// Only run uncompressed round trips
        #[arg(long, conflicts_with = "compressed_only")]
        raw_only: bool,

        /// Only run compressed round trips
        #[arg(long)]
        compressed_only: bool,

        /// Owned children in the complex sample
        #[arg(long, default_value_t = DEFAULT_CHILDREN, value_parser = parse_children)]
        children: usize,
    },

    /// Build the sample graph and write it to a save-game file
    Save {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Owned children in the saved object
        #[arg(long, default_value_t = DEFAULT_CHILDREN, value_parser = parse_children)]
        children: usize,
    },

    /// Validate a save-game file and print its header
    Inspect {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Rebuild the saved object and print its owned object tree
    Load {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Child counts are stored as one array, so they share the array limit.
fn parse_children(s: &str) -> Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{}", e))?;
    if n > MAX_ARRAY_LENGTH {
        return Err(format!("at most {} children are supported", MAX_ARRAY_LENGTH));
    }
    Ok(n)
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), FlakesError> {
    let registry = ProviderRegistry::with_builtin();
    let config = FlakesConfig::discover(cli.config.as_deref())?.with_provider(cli.provider.as_deref());
    config.validate(&registry)?;

    let ctx = Context {
        flakes: config.flakes(registry),
        config,
        json_mode: cli.json_mode,
        verbose: cli.verbose,
        only_provider: cli.provider,
    };

    match cli.command {
        Some(Commands::Providers) | None => cmd_providers(&ctx),
        Some(Commands::Selftest {
            raw_only,
            compressed_only,
            children,
        }) => cmd_selftest(&ctx, raw_only, compressed_only, children),
        Some(Commands::Save { output, children }) => cmd_save(&ctx, &output, children),
        Some(Commands::Inspect { input }) => cmd_inspect(&ctx, &input),
        Some(Commands::Load { input }) => cmd_load(&ctx, &input),
        Some(Commands::Config) => cmd_config(&ctx),
    }
}
