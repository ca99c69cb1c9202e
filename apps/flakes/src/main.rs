//! # Flakes - Object Graph Snapshots
//!
//! The command-line binary for the Flakes serialization engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │              apps/flakes (THE BINARY)             │
//! │                                                   │
//! │   ┌─────────────┐          ┌──────────────────┐   │
//! │   │    CLI      │          │   flakes.toml    │   │
//! │   │   (clap)    │◀─────────│  (toml + serde)  │   │
//! │   └──────┬──────┘          └──────────────────┘   │
//! │          ▼                                        │
//! │   ┌───────────────┐                               │
//! │   │  flakes-core  │                               │
//! │   │ (THE ENGINE)  │                               │
//! │   └───────────────┘                               │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! flakes providers
//! flakes selftest --raw-only
//! flakes --provider Json save -o hero.sav --children 25
//! flakes inspect -i hero.sav
//! flakes load -i hero.sav
//! ```

use clap::Parser;
use flakes::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // FLAKES_LOG_FORMAT=json switches logs to JSON lines.
    let log_format = std::env::var("FLAKES_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "flakes=debug,flakes_core=debug"
    } else {
        "flakes=info,flakes_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // No banner in JSON mode.
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Flakes startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗██╗      █████╗ ██╗  ██╗███████╗███████╗
  ██╔════╝██║     ██╔══██╗██║ ██╔╝██╔════╝██╔════╝
  █████╗  ██║     ███████║█████╔╝ █████╗  ███████╗
  ██╔══╝  ██║     ██╔══██║██╔═██╗ ██╔══╝  ╚════██║
  ██║     ███████╗██║  ██║██║  ██╗███████╗███████║
  ╚═╝     ╚══════╝╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝╚══════╝

  Object Graph Snapshots v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
