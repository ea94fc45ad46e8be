// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # stackctl
//!
//! Installs and operates a single-host registry stack: a PostgreSQL
//! datastore, a Redis cache and the registry itself, on one container
//! network, supervised by the user's systemd instance.
//!
//! ## Commands
//!
//! - `stackctl install` - Provision, checkpoint, patch and hand over to systemd
//! - `stackctl start` - Bring the stack up through the runtime
//! - `stackctl teardown` - Remove everything install created
//! - `stackctl status` - Show container and unit state
//! - `stackctl config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use stackctl::commands::{self, ConfigCommand};

/// Single-host registry stack orchestrator
#[derive(Parser)]
#[command(name = "stackctl")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to the stack env file
    #[arg(
        short,
        long,
        global = true,
        env = "STACKCTL_ENV_FILE",
        value_name = "FILE",
        default_value = "./stack.env"
    )]
    env_file: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "STACKCTL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install the stack, pausing for the configuration checkpoint
    #[command(name = "install")]
    Install,

    /// Start every layer against an existing configuration
    #[command(name = "start")]
    Start,

    /// Stop and remove the stack
    #[command(name = "teardown")]
    Teardown,

    /// Show service state
    #[command(name = "status")]
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Install => commands::install::handle_command(&cli.env_file).await,
        Commands::Start => commands::start::handle_command(&cli.env_file).await,
        Commands::Teardown => commands::teardown::handle_command(&cli.env_file).await,
        Commands::Status { json } => commands::status::handle_command(&cli.env_file, json).await,
        Commands::Config { command } => commands::config::handle_command(command, &cli.env_file).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
