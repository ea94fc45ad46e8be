// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Teardown command
//!
//! Declining data deletion is a successful teardown.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use stack_core::domain::outcome::StepOutcome;

pub async fn handle_command(env_file: &Path) -> Result<()> {
    let orchestrator = super::connect(env_file).await?;
    let report = orchestrator.teardown().await?;

    for record in &report.steps {
        let line = match &record.outcome {
            StepOutcome::Completed => format!("✓ {}", record.step).green(),
            StepOutcome::AlreadySatisfied(note) => format!("ℹ {} ({})", record.step, note).dimmed(),
            StepOutcome::Tolerated(note) => format!("⚠ {}: {}", record.step, note).yellow(),
            StepOutcome::Declined(note) => format!("ℹ {}: {}", record.step, note).yellow(),
        };
        println!("{}", line);
    }

    println!();
    if report.data_removed() {
        println!("{}", "Stack removed, including all data.".bold().green());
    } else {
        println!("{}", "Stack removed.".bold().green());
    }

    Ok(())
}
