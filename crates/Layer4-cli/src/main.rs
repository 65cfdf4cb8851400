//! tasktrack CLI - Main entry point

mod cli;
mod render;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tasktrack_foundation::TrackerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// tasktrack - run commands and watch their lifecycle
#[derive(Parser, Debug)]
#[command(name = "tasktrack")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the task database (overrides config)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Keep everything in memory for this invocation
    #[arg(long, global = true)]
    memory: bool,

    /// Processing delay before each execution, in milliseconds (overrides config)
    #[arg(long, global = true)]
    delay_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute commands and stream their lifecycle events
    Run {
        /// Commands to execute, one task each
        #[arg(required = true)]
        commands: Vec<String>,

        /// Agent to attribute the tasks to
        #[arg(short, long)]
        agent: Option<String>,

        /// Print raw JSON events instead of formatted lines
        #[arg(long)]
        json: bool,
    },
    /// Create a pending task
    Create {
        name: String,
        command: String,

        #[arg(short, long)]
        agent: Option<String>,

        /// Schedule it right away and wait for it
        #[arg(long)]
        start: bool,
    },
    /// List tasks
    Tasks {
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Page size (defaults to config)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show one task as JSON
    Task { id: String },
    /// List log records, newest first
    Logs {
        /// debug, info, warning or error
        #[arg(long)]
        level: Option<String>,

        #[arg(long)]
        source: Option<String>,

        /// Only records for this task id
        #[arg(long)]
        task: Option<String>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Inspect or delete one log record
    Log {
        #[command(subcommand)]
        action: LogAction,
    },
    /// Manage registered agents
    Agent {
        #[command(subcommand)]
        action: AgentAction,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the global or project config file
        #[arg(long, value_enum)]
        save: Option<ConfigScope>,
    },
}

#[derive(Subcommand, Debug)]
pub enum AgentAction {
    /// List agents by id
    List {
        #[arg(long, default_value = "0")]
        skip: usize,

        /// Page size (defaults to config)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show one agent as JSON
    Show { id: i64 },
    /// Register a new agent
    Register {
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },
    /// Record a heartbeat, marking the agent active
    Heartbeat { id: i64 },
    /// Remove an agent
    Delete { id: i64 },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigScope {
    /// ~/.config/tasktrack/config.json
    Global,
    /// ./.tasktrack/config.json
    Project,
}

#[derive(Subcommand, Debug)]
pub enum LogAction {
    /// Show one log record as JSON
    Show { id: i64 },
    /// Delete one log record
    Delete { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stderr keeps stdout for command output)
    let log_level = if args.debug { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Load configuration
    let mut config = TrackerConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        TrackerConfig::new()
    });
    if let Some(dir) = args.data_dir {
        config.storage.data_dir = Some(dir);
    }
    if let Some(delay_ms) = args.delay_ms {
        config.scheduler.processing_delay_ms = delay_ms;
    }

    let options = cli::Options {
        memory: args.memory,
    };
    cli::dispatch(config, options, args.command).await
}
