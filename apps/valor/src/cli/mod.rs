//! # Valor CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Create an empty sheet database
//! - `status` - Entity and collection counts
//! - `tree` - Print an entity and everything beneath it
//! - `totals` - Point totals of a character
//! - `sheet` - Every derived value of a character, as JSON
//! - `feed` - Apply a change feed (JSON lines) to the database

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;

/// Error type at the CLI boundary.
pub type CliError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Valor - GURPS character sheet server
#[derive(Parser, Debug)]
#[command(name = "valor")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the sheet database (overrides config and VALOR_DATABASE)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where a session keeps its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Volatile; everything is lost on exit.
    Memory,
    /// redb database file.
    Redb,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize a new empty database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show entity and collection counts
    Status,

    /// Print an entity and its descendants
    Tree {
        /// Entity id
        id: String,

        /// Maximum depth below the entity
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Show a character's point totals
    Totals {
        /// Character id
        id: String,
    },

    /// Print every derived value of a character
    Sheet {
        /// Character id
        id: String,
    },

    /// Apply a change feed of JSON lines
    Feed {
        /// Path to the feed file
        #[arg(short, long)]
        file: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    let backend = cli.backend;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            cmd_server(&config, backend).await
        }
        Some(Commands::Init { force }) => cmd_init(&config, backend, force),
        Some(Commands::Status) | None => cmd_status(&config, backend, json_mode),
        Some(Commands::Tree { id, depth }) => cmd_tree(&config, backend, &id, depth),
        Some(Commands::Totals { id }) => cmd_totals(&config, backend, json_mode, &id),
        Some(Commands::Sheet { id }) => cmd_sheet(&config, backend, &id),
        Some(Commands::Feed { file }) => cmd_feed(&config, backend, json_mode, &file),
    }
}
