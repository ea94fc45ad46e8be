// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Install command

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use stack_core::domain::outcome::StepOutcome;

pub async fn handle_command(env_file: &Path) -> Result<()> {
    let orchestrator = super::connect(env_file).await?;
    let summary = orchestrator.install().await?;

    println!("{}", format!("✓ Network {}: {}", orchestrator.config().network.name, summary.network).green());
    for (service, address) in summary.addresses.iter() {
        println!("{}", format!("✓ {} ready at {}", service, address).green());
    }
    if let Some(StepOutcome::Tolerated(reason)) = &summary.editor_removal {
        println!("{}", format!("ℹ Config editor left behind: {}", reason).yellow());
    }
    println!(
        "{}",
        format!(
            "✓ Patched {} ({} line(s) removed)",
            summary.patch.settings_file.display(),
            summary.patch.removed.len()
        )
        .green()
    );
    for unit in &summary.units {
        println!("{}", format!("✓ Wrote {}", unit.display()).green());
    }
    println!("{}", format!("✓ Started {}", summary.activated_unit).green());

    println!();
    println!("{}", "Stack installed successfully!".bold().green());
    println!();
    println!("To check status:");
    println!("  stackctl status");
    println!("  systemctl --user status {}", summary.activated_unit);

    Ok(())
}
