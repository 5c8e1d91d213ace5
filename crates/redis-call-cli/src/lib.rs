//! # redis-queue CLI
//!
//! Command-line interface for inspecting and repairing redis-call queues.
//!
//! This module provides CLI commands for:
//! - Listing queue lists and their lengths
//! - Pushing, popping and viewing elements
//! - Restoring backup lists after consumer crashes
//! - Deleting queues

use clap::{Parser, Subcommand};
use redis_call::{
    ClientConfig, Connection, ConfigurationError, Connector, Endpoint, Queue, QueueList,
    RedisCallError, RedisConnector,
};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ============================================================================
// CLI Structure
// ============================================================================

/// redis-queue - Inspect and repair reliable Redis queues
#[derive(Parser, Debug)]
#[command(name = "redis-queue")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and repair reliable Redis queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "REDIS_CALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Redis host, overrides the configuration
    #[arg(long)]
    pub host: Option<String>,

    /// Redis port, overrides the configuration
    #[arg(long)]
    pub port: Option<u16>,

    /// Redis Unix socket, overrides host and port
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List every queue list with its length
    List,

    /// Delete queues with their backup and error lists
    Delete {
        /// Queue names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Push an element onto a queue
    Push {
        queue: String,

        /// Element to push
        payload: String,

        /// Treat the payload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Pop the oldest element of a queue
    Pop {
        queue: String,

        /// Decode elements as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the elements of one of a queue's lists, newest first
    Elements {
        queue: String,

        /// Which list to show
        #[arg(short, long, value_enum, default_value = "main")]
        list: ListArg,

        /// Decode elements as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move backup elements back onto the queue
    Restore {
        queue: String,

        /// JSON elements; applies the retry limit and dead-letters repeat
        /// offenders
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Queue the command operates on, if it targets a single one
    pub fn queue(&self) -> Option<&str> {
        match self {
            Self::List | Self::Delete { .. } => None,
            Self::Push { queue, .. }
            | Self::Pop { queue, .. }
            | Self::Elements { queue, .. }
            | Self::Restore { queue, .. } => Some(queue),
        }
    }
}

/// Queue list selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ListArg {
    Main,
    Backup,
    Error,
}

impl From<ListArg> for QueueList {
    fn from(arg: ListArg) -> Self {
        match arg {
            ListArg::Main => QueueList::Main,
            ListArg::Backup => QueueList::Backup,
            ListArg::Error => QueueList::Error,
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI-specific errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Store error: {0}")]
    Store(#[from] RedisCallError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging setup failed: {message}")]
    Logging { message: String },
}

// ============================================================================
// Main Entry Point
// ============================================================================

/// Main CLI entry point
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = load_configuration(&cli)?;
    let endpoint = resolve_endpoint(&config, cli.command.queue());
    debug!(endpoint = %endpoint, "Resolved endpoint");

    let connector = RedisConnector::new();
    let mut conn = Connection::open(&connector as &dyn Connector, &endpoint).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = execute_command(&cli.command, &mut conn, &mut out).await;

    if let Err(e) = conn.disconnect().await {
        debug!(error = %e, "Disconnect failed");
    }
    result
}

/// Initialize logging based on CLI arguments
pub fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .map_err(|e| CliError::Logging {
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    installed.map_err(|e| CliError::Logging {
        message: e.to_string(),
    })
}

/// Load configuration and apply connection overrides from the command line
pub fn load_configuration(cli: &Cli) -> Result<ClientConfig, CliError> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;

    if cli.socket.is_some() || cli.host.is_some() || cli.port.is_some() {
        config.connection.socket = cli.socket.clone();
        config.connection.host = cli.host.clone().or(config.connection.host);
        config.connection.port = cli.port.or(config.connection.port);
    }
    if cli.port == Some(0) {
        return Err(CliError::InvalidArgument {
            arg: "--port".to_string(),
            message: "must be non-zero".to_string(),
        });
    }
    Ok(config)
}

/// Endpoint for a command: the queue's own endpoint when it has one
pub fn resolve_endpoint(config: &ClientConfig, queue: Option<&str>) -> Endpoint {
    match queue {
        Some(queue) => config.queue_endpoint(queue),
        None => config.connection.endpoint(),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Run one command against an open connection, writing results to `out`
pub async fn execute_command(
    command: &Commands,
    conn: &mut Connection,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    match command {
        Commands::List => {
            for (key, len) in Queue::list(conn).await? {
                writeln!(out, "{}\t{}", key, len)?;
            }
        }
        Commands::Delete { names } => {
            let deleted = Queue::delete_all(conn, names.as_slice()).await?;
            info!(queues = ?names, deleted = deleted, "Deleted queues");
            writeln!(out, "{}", deleted)?;
        }
        Commands::Push {
            queue,
            payload,
            json,
        } => {
            let element = parse_element(payload, *json)?;
            let len = queue_for(queue, *json).push(conn, &element).await?.ready()?;
            writeln!(out, "{}", len)?;
        }
        Commands::Pop { queue, json } => {
            if let Some(element) = queue_for(queue, *json).pop(conn).await?.ready()? {
                writeln!(out, "{}", render(&element))?;
            }
        }
        Commands::Elements { queue, list, json } => {
            for element in queue_for(queue, *json).elements(conn, (*list).into()).await? {
                writeln!(out, "{}", render(&element))?;
            }
        }
        Commands::Restore { queue, json } => {
            let report = queue_for(queue, *json).restore_backup(conn).await?;
            writeln!(
                out,
                "requeued {}, dead-lettered {}, discarded {}",
                report.requeued, report.dead_lettered, report.discarded
            )?;
        }
    }
    Ok(())
}

fn queue_for(name: &str, json: bool) -> Queue {
    if json {
        Queue::json(name)
    } else {
        Queue::new(name)
    }
}

fn parse_element(payload: &str, json: bool) -> Result<Value, CliError> {
    if !json {
        return Ok(Value::String(payload.to_string()));
    }
    serde_json::from_str(payload).map_err(|e| CliError::InvalidArgument {
        arg: "payload".to_string(),
        message: e.to_string(),
    })
}

fn render(element: &Value) -> String {
    match element {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
