// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use stack_core::domain::service::{config_editor, stack_services};
use stack_core::domain::stack_config::StackConfig;

/// Sample env file written by `config generate`.
pub const SAMPLE_ENV: &str = include_str!("../../templates/stack.env.example");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the resolved configuration (credentials redacted)
    Show,

    /// Validate an env file
    Validate {
        /// Path to env file (default: --env-file)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a sample env file
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./stack.env")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, env_file: &Path) -> Result<()> {
    match command {
        ConfigCommand::Show => show(env_file),
        ConfigCommand::Validate { file } => validate(file.as_deref().unwrap_or(env_file)),
        ConfigCommand::Generate { output, force } => generate(&output, force),
    }
}

fn show(env_file: &Path) -> Result<()> {
    let config = super::load_config(env_file)?;

    println!("{}", format!("Configuration from {}:", config.source.display()).bold());
    println!();

    println!("{}", "Stack:".bold());
    println!("  Name: {}", config.stack_name);
    println!("  Data root: {}", config.paths.root.display());
    println!("  Unit directory: {}", config.unit_dir.display());
    println!(
        "  Runtime socket: {}",
        config.runtime_socket.as_deref().unwrap_or("(client default)")
    );
    println!();

    println!("{}", "Network:".bold());
    println!("  Name: {}", config.network.name);
    match &config.network.subnet {
        Some(subnet) => println!("  Subnet: {}", subnet),
        None => println!("  Subnet: {}", "(runtime default)".dimmed()),
    }
    println!();

    println!("{}", "Services:".bold());
    for service in stack_services(&config).iter().chain(config_editor(&config).iter()) {
        println!("  {} ({})", service.name.bold(), service.kind);
        println!("    Image: {}", service.image);
        if let Some(address) = service.address {
            println!("    Address: {}", address);
        }
        for port in &service.ports {
            println!("    Port: {}", port);
        }
        if !service.depends_on.is_empty() {
            println!("    Depends on: {}", service.depends_on.join(", "));
        }
    }
    println!();

    println!("{}", "Credentials:".bold());
    println!("  Database: {} / {}", config.datastore.user, config.datastore.password);
    println!("  Redis: {}", config.cache.password);
    println!();

    println!("{}", "Checkpoint:".bold());
    println!("  Archive: {}", config.checkpoint.archive.display());
    println!("  Remove after patching: {}", config.checkpoint.remove_archive);
    println!(
        "  Readiness: {} attempts every {}s",
        config.timings.probe_attempts,
        config.timings.probe_interval.as_secs()
    );

    Ok(())
}

fn validate(env_file: &Path) -> Result<()> {
    println!("Validating configuration...");

    let config = StackConfig::load(env_file)
        .with_context(|| format!("Configuration validation failed for {}", env_file.display()))?;
    stack_core::domain::graph::StackGraph::new(stack_services(&config))
        .context("Service graph validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    std::fs::write(output, SAMPLE_ENV)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_env_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.env");
        std::fs::write(&path, format!("{}\nUNIT_DIR=/tmp/units\n", SAMPLE_ENV)).unwrap();

        let config = StackConfig::load(&path).unwrap();
        assert_eq!(config.network.name, "quay-net");
        assert_eq!(config.datastore.password.expose(), "change-me");
    }

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.env");
        std::fs::write(&path, "NETWORK_NAME=keep\n").unwrap();

        assert!(generate(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "NETWORK_NAME=keep\n");

        generate(&path, true).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), SAMPLE_ENV);
    }
}
