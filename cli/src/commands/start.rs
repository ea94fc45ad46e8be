// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Start command

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

pub async fn handle_command(env_file: &Path) -> Result<()> {
    let orchestrator = super::connect(env_file).await?;
    let addresses = orchestrator.start().await?;

    for (service, address) in addresses.iter() {
        println!("{}", format!("✓ {} up at {}", service, address).green());
    }
    println!("{}", "Stack started".bold().green());

    Ok(())
}
