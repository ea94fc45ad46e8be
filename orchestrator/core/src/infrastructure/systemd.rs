// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Systemd user manager
//!
//! Drives `systemctl --user`. Quadlet units live in the user's unit
//! directory, so every call goes to the per-user manager over the user bus.

use async_trait::async_trait;
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

use crate::domain::init_system::{InitSystem, InitSystemError, UnitEnable, UnitStop};

pub struct SystemdUser {
    program: String,
}

impl SystemdUser {
    pub fn new() -> Self {
        Self {
            program: "systemctl".to_string(),
        }
    }

    async fn systemctl(&self, args: &[&str]) -> Result<Output, InitSystemError> {
        debug!(args = ?args, "Invoking systemctl --user");
        Command::new(&self.program)
            .arg("--user")
            .args(args)
            .output()
            .await
            .map_err(|e| InitSystemError::Spawn(format!("{}: {}", self.program, e)))
    }

    /// Run `args` and require success, classifying bus failures.
    async fn checked(&self, args: &[&str]) -> Result<Output, InitSystemError> {
        let output = self.systemctl(args).await?;
        if output.status.success() {
            return Ok(output);
        }
        Err(classify_failure(args, &String::from_utf8_lossy(&output.stderr)))
    }
}

impl Default for SystemdUser {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_failure(args: &[&str], stderr: &str) -> InitSystemError {
    let stderr = stderr.trim();
    if stderr.contains("Failed to connect to bus") || stderr.contains("Failed to connect to user scope bus") {
        return InitSystemError::ChannelUnreachable(stderr.to_string());
    }
    InitSystemError::CommandFailed {
        command: format!("systemctl --user {}", args.join(" ")),
        stderr: stderr.to_string(),
    }
}

fn is_not_loaded(stderr: &str) -> bool {
    stderr.contains("not loaded") || stderr.contains("not found")
}

fn is_generated(stderr: &str) -> bool {
    stderr.contains("transient or generated")
}

#[async_trait]
impl InitSystem for SystemdUser {
    async fn reload(&self) -> Result<(), InitSystemError> {
        self.checked(&["daemon-reload"]).await?;
        Ok(())
    }

    async fn unit_loaded(&self, unit: &str) -> Result<bool, InitSystemError> {
        let output = self.checked(&["show", "-p", "LoadState", "--value", unit]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "loaded")
    }

    async fn enable(&self, unit: &str) -> Result<UnitEnable, InitSystemError> {
        let args = ["enable", unit];
        let output = self.systemctl(&args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            return Ok(UnitEnable::Enabled);
        }
        if is_generated(&stderr) {
            return Ok(UnitEnable::Generated);
        }
        Err(classify_failure(&args, &stderr))
    }

    async fn start(&self, unit: &str) -> Result<(), InitSystemError> {
        self.checked(&["start", unit]).await?;
        Ok(())
    }

    async fn stop(&self, unit: &str) -> Result<UnitStop, InitSystemError> {
        let args = ["stop", unit];
        let output = self.systemctl(&args).await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if output.status.success() {
            return Ok(UnitStop::Stopped);
        }
        if is_not_loaded(&stderr) {
            return Ok(UnitStop::NotLoaded);
        }
        Err(classify_failure(&args, &stderr))
    }

    async fn active_state(&self, unit: &str) -> Result<String, InitSystemError> {
        // is-active exits non-zero for every state but "active"
        let args = ["is-active", unit];
        let output = self.systemctl(&args).await?;
        let state = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if state.is_empty() {
            return Err(classify_failure(&args, &String::from_utf8_lossy(&output.stderr)));
        }
        Ok(state)
    }
}
