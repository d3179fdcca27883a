//! # Tessera - Manifest-Driven Data Store
//!
//! The main binary for the Tessera dispatch and ingestion core.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │           apps/tessera (THE BINARY)           │
//! │                                               │
//! │   ┌──────────────┐     ┌──────────────────┐   │
//! │   │  CLI (clap)  │────▶│  config loading  │   │
//! │   └──────┬───────┘     └────────┬─────────┘   │
//! │          └──────────┬───────────┘             │
//! │                     ▼                         │
//! │             ┌───────────────┐                 │
//! │             │ tessera-core  │                 │
//! │             │ (THE ENGINE)  │                 │
//! │             └───────────────┘                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! tessera --config tessera.toml check
//! tessera --config tessera.toml migrate
//! tessera --config tessera.toml push -f batch.json
//! tessera --config tessera.toml get -m report
//! ```

use clap::Parser;
use tessera::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // TESSERA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TESSERA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tessera=info,tessera_core=info".into());

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

    let cli = cli::Cli::parse();

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Tessera startup banner.
fn print_banner() {
    eprintln!(
        r#"
  ╔╦╗╔═╗╔═╗╔═╗╔═╗╦═╗╔═╗
   ║ ║╣ ╚═╗╚═╗║╣ ╠╦╝╠═╣
   ╩ ╚═╝╚═╝╚═╝╚═╝╩╚═╩ ╩

  Manifest-driven data store v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
