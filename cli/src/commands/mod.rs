// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for stackctl

pub mod config;
pub mod install;
pub mod start;
pub mod status;
pub mod teardown;

pub use self::config::ConfigCommand;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::console::ConsoleOperator;
use stack_core::application::StackOrchestrator;
use stack_core::domain::stack_config::StackConfig;
use stack_core::infrastructure::{DockerRuntime, SystemdUser};

pub(crate) fn load_config(env_file: &Path) -> Result<StackConfig> {
    StackConfig::load(env_file)
        .with_context(|| format!("Failed to load configuration from {}", env_file.display()))
}

/// Wire the workflows to the container runtime, systemd and the terminal.
pub(crate) async fn connect(env_file: &Path) -> Result<StackOrchestrator> {
    let config = load_config(env_file)?;

    let runtime = DockerRuntime::new(config.runtime_socket.clone())
        .context("Failed to initialize container runtime")?;
    runtime
        .healthcheck()
        .await
        .context("Container runtime is not reachable")?;

    let orchestrator = StackOrchestrator::new(
        config,
        Arc::new(runtime),
        Arc::new(SystemdUser::new()),
        Arc::new(ConsoleOperator::new()),
    )?;
    Ok(orchestrator)
}
