//! # Valor - GURPS Character Sheet Server
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │               apps/valor (THE BINARY)         │
//! │                                               │
//! │   ┌─────────────┐         ┌─────────────┐     │
//! │   │    CLI      │         │  HTTP API   │     │
//! │   │   (clap)    │         │   (axum)    │     │
//! │   └──────┬──────┘         └──────┬──────┘     │
//! │          └───────────┬───────────┘            │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │  valor-core   │                │
//! │              │ graph + rules │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! valor init
//! valor server --host 0.0.0.0 --port 8080
//! valor tree <character-id>
//! valor totals <character-id>
//! valor feed -f changes.jsonl
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use valor::cli;

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // VALOR_LOG_FORMAT=json switches to machine-parseable output.
    let log_format = std::env::var("VALOR_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "valor=debug,valor_core=debug,tower_http=debug"
    } else {
        "valor=info,valor_core=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ██╗   ██╗ █████╗ ██╗      ██████╗ ██████╗
  ██║   ██║██╔══██╗██║     ██╔═══██╗██╔══██╗
  ██║   ██║███████║██║     ██║   ██║██████╔╝
  ╚██╗ ██╔╝██╔══██║██║     ██║   ██║██╔══██╗
   ╚████╔╝ ██║  ██║███████╗╚██████╔╝██║  ██║
    ╚═══╝  ╚═╝  ╚═╝╚══════╝ ╚═════╝ ╚═╝  ╚═╝

  GURPS Sheet Server v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
