// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitSystemError {
    /// The init system's control channel (user bus) could not be reached
    #[error("Init system control channel unreachable: {0}")]
    ChannelUnreachable(String),
    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("Failed to invoke init system: {0}")]
    Spawn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStop {
    Stopped,
    NotLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEnable {
    Enabled,
    /// Generated units cannot be enabled; their `[Install]` section is
    /// applied by the generator instead
    Generated,
}

/// Control surface of the init system that supervises the stack's units.
#[async_trait]
pub trait InitSystem: Send + Sync {
    /// Re-read unit files, running generators.
    async fn reload(&self) -> Result<(), InitSystemError>;
    async fn unit_loaded(&self, unit: &str) -> Result<bool, InitSystemError>;
    async fn enable(&self, unit: &str) -> Result<UnitEnable, InitSystemError>;
    async fn start(&self, unit: &str) -> Result<(), InitSystemError>;
    async fn stop(&self, unit: &str) -> Result<UnitStop, InitSystemError>;
    async fn active_state(&self, unit: &str) -> Result<String, InitSystemError>;
}
