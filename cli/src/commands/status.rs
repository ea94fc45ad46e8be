// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Status command

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

use stack_core::application::ServiceStatus;

pub async fn handle_command(env_file: &Path, as_json: bool) -> Result<()> {
    let orchestrator = super::connect(env_file).await?;
    let statuses = orchestrator.status().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&to_json(&statuses))?);
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:<10} {:<16} {}",
        "SERVICE".bold(),
        "KIND".bold(),
        "CONTAINER".bold(),
        "ADDRESS".bold(),
        "UNIT".bold()
    );
    for status in &statuses {
        let container = match status.container_state.as_deref() {
            Some("running") => "running".green(),
            Some(other) => other.yellow(),
            None => "absent".red(),
        };
        let unit = if status.unit_state == "active" {
            status.unit_state.green()
        } else {
            status.unit_state.dimmed()
        };
        println!(
            "{:<24} {:<12} {:<10} {:<16} {}",
            status.name,
            status.kind.to_string(),
            container,
            status.address.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            unit
        );
    }

    Ok(())
}

fn to_json(statuses: &[ServiceStatus]) -> serde_json::Value {
    serde_json::Value::Array(
        statuses
            .iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "kind": s.kind.to_string(),
                    "container": s.container_state,
                    "address": s.address.map(|a| a.to_string()),
                    "unit": s.unit_state,
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use stack_core::domain::service::ServiceKind;
    use std::net::Ipv4Addr;

    #[test]
    fn test_json_marks_absent_container_as_null() {
        let statuses = vec![ServiceStatus {
            name: "quay-redis".to_string(),
            kind: ServiceKind::Cache,
            container_state: None,
            address: Some(Ipv4Addr::new(10, 90, 0, 11)),
            unit_state: "inactive".to_string(),
        }];

        let value = to_json(&statuses);
        assert_eq!(value[0]["container"], serde_json::Value::Null);
        assert_eq!(value[0]["address"], "10.90.0.11");
        assert_eq!(value[0]["kind"], "cache");
    }
}
