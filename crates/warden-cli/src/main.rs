//! Warden CLI - tool-execution safety gateway.
//!
//! `warden serve` speaks JSON-RPC on stdin/stdout; the other commands
//! inspect configuration and the audit log.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use warden_core::ExecutionStatus;
use warden_telemetry::{LogConfig, LogFormat};

mod commands;
mod theme;

use commands::{audit, check, serve, tools};

/// Warden - tool-execution safety gateway
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "WARDEN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-RPC on stdin/stdout; SIGHUP reloads tools and roles
    Serve,

    /// Validate the configuration
    Check {
        /// Show which layer set each value
        #[arg(long)]
        sources: bool,
    },

    /// Print the tool catalogue
    Tools {
        /// Print descriptors as JSON
        #[arg(long)]
        json: bool,
    },

    /// Query and verify the audit log
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
enum AuditCommands {
    /// List records matching the filters
    Query {
        /// Principal id
        #[arg(long)]
        principal: Option<String>,
        /// Tool name
        #[arg(long)]
        tool: Option<String>,
        /// Final status (e.g. Denied, Completed)
        #[arg(long, value_parser = audit::parse_status)]
        status: Option<ExecutionStatus>,
        /// Earliest timestamp, RFC 3339, inclusive
        #[arg(long)]
        since: Option<String>,
        /// Latest timestamp, RFC 3339, exclusive
        #[arg(long)]
        until: Option<String>,
        /// Correlation id
        #[arg(long)]
        correlation_id: Option<String>,
        /// Maximum records to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Print records as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Verify the hash chain
    Verify,
}

fn log_config(cli: &Cli) -> LogConfig {
    // Lenient load: a broken config is reported by the command itself.
    let loaded = warden_config::Config::load(cli.config.as_deref())
        .ok()
        .and_then(|r| LogConfig::from_section(&r.config.logging).ok());
    let mut config =
        loaded.unwrap_or_else(|| LogConfig::new("warn").with_format(LogFormat::Compact));
    if cli.verbose {
        "debug".clone_into(&mut config.level);
    }
    if matches!(cli.command, Commands::Serve) {
        config = config.protocol_safe();
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = warden_telemetry::setup_logging(&log_config(&cli)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve => serve::run_serve(config_path).await?,
        Commands::Check { sources } => check::run_check(config_path, sources)?,
        Commands::Tools { json } => tools::list_tools(config_path, json)?,
        Commands::Audit { command } => match command {
            AuditCommands::Query {
                principal,
                tool,
                status,
                since,
                until,
                correlation_id,
                limit,
                json,
            } => {
                let filter = audit::build_filter(audit::FilterArgs {
                    principal,
                    tool,
                    status,
                    since,
                    until,
                    correlation_id,
                    limit,
                })?;
                audit::query(config_path, filter, json)?;
            },
            AuditCommands::Verify => audit::verify(config_path)?,
        },
    }

    Ok(())
}
