//! # Tessera CLI Module
//!
//! This module implements the CLI interface for Tessera.
//!
//! ## Available Commands
//!
//! - `types` - List registered schema types
//! - `commands` - List the dispatch table
//! - `check` - Load the configuration and check every manifest
//! - `prepare` - Validate backend constraints of every model
//! - `migrate` - Create backend storage for every model
//! - `push` - Store a batch of records in one transaction
//! - `pull` - Map local source data of a dataset to records
//! - `get` - Read stored records back
//! - `serialize` - Dump every loaded object

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tessera_core::TesseraError;
use tessera_core::primitives::{DEFAULT_BACKEND, DEFAULT_NAMESPACE};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Tessera - manifest-driven data store
///
/// Loads typed manifests, dispatches operations to backend handlers and
/// pushes record batches transactionally.
#[derive(Parser, Debug)]
#[command(name = "tessera")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file (TOML or JSON)
    #[arg(short = 'c', long, global = true, default_value = "tessera.toml")]
    pub config: PathBuf,

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
    /// List registered schema types
    Types,

    /// List registered handlers by dispatch key
    Commands,

    /// Load the configuration and check every manifest
    Check,

    /// Validate backend-specific constraints of every model
    Prepare {
        /// Run on the internal manifest only
        #[arg(long)]
        internal: bool,
    },

    /// Create backend storage for every model
    Migrate {
        /// Run on the internal manifest only
        #[arg(long)]
        internal: bool,
    },

    /// Push a batch of records in one transaction
    Push {
        /// Path to the batch (JSON array or JSON lines)
        #[arg(short, long)]
        file: PathBuf,

        /// Backend receiving the batch
        #[arg(short, long, default_value = DEFAULT_BACKEND)]
        backend: String,

        /// Namespace the record types belong to
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Map local source rows of a dataset to records, optionally pushing them
    Pull {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Path to the sources (JSON mapping of source name to rows)
        #[arg(short, long)]
        file: PathBuf,

        /// Only pull these dataset objects
        #[arg(short, long)]
        model: Vec<String>,

        /// Push the pulled records in one transaction
        #[arg(long)]
        push: bool,

        /// Backend receiving pushed records
        #[arg(short, long, default_value = DEFAULT_BACKEND)]
        backend: String,

        /// Namespace the dataset belongs to
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Read stored records of a model
    Get {
        /// Model name
        #[arg(short, long)]
        model: String,

        /// Return a single record
        #[arg(long)]
        id: Option<String>,

        /// Backend to read from
        #[arg(short, long, default_value = DEFAULT_BACKEND)]
        backend: String,

        /// Namespace the model belongs to
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Print every loaded object as JSON
    Serialize,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), TesseraError> {
    let json_mode = cli.json_mode;
    let config = cli.config.as_path();

    if cli.verbose {
        tracing::info!(config = %config.display(), "using configuration");
    }

    match cli.command {
        Some(Commands::Types) => cmd_types(json_mode),
        Some(Commands::Commands) => cmd_commands(json_mode),
        Some(Commands::Check) | None => cmd_check(config, json_mode),
        Some(Commands::Prepare { internal }) => cmd_prepare(config, internal),
        Some(Commands::Migrate { internal }) => cmd_migrate(config, internal),
        Some(Commands::Push {
            file,
            backend,
            namespace,
        }) => cmd_push(config, json_mode, &file, &backend, &namespace),
        Some(Commands::Pull {
            dataset,
            file,
            model,
            push,
            backend,
            namespace,
        }) => cmd_pull(
            config,
            json_mode,
            &PullArgs {
                dataset: &dataset,
                file: &file,
                models: &model,
                push,
                backend: &backend,
                namespace: &namespace,
            },
        ),
        Some(Commands::Get {
            model,
            id,
            backend,
            namespace,
        }) => cmd_get(config, json_mode, &model, id.as_deref(), &backend, &namespace),
        Some(Commands::Serialize) => cmd_serialize(config),
    }
}
