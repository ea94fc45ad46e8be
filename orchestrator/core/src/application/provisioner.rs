// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource Provisioner
//!
//! Idempotent "ensure" semantics for the shared infrastructure: a resource
//! is created only when absent, and an existing resource is accepted as is.
//! An existing network whose subnet differs from the requested one is
//! reported, never recreated.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::errors::StackError;
use crate::domain::outcome::StepOutcome;
use crate::domain::runtime::{ContainerRuntime, NetworkSpec};
use crate::domain::stack_config::Subnet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkOutcome {
    Created,
    Existing,
    /// Network exists but none of its subnets is the requested one
    SubnetMismatch { requested: String, actual: Vec<String> },
}

impl fmt::Display for NetworkOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkOutcome::Created => f.write_str("created"),
            NetworkOutcome::Existing => f.write_str("already exists"),
            NetworkOutcome::SubnetMismatch { requested, actual } => write!(
                f,
                "exists with subnet(s) [{}], configured {}",
                actual.join(", "),
                requested
            ),
        }
    }
}

pub async fn ensure_network(
    runtime: &dyn ContainerRuntime,
    name: &str,
    subnet: Option<Subnet>,
) -> Result<NetworkOutcome, StackError> {
    let requested = subnet.map(|s| s.to_string());

    let existing = runtime
        .inspect_network(name)
        .await
        .map_err(|e| StackError::Provision(e.to_string()))?;

    if let Some(info) = existing {
        return match requested {
            Some(requested) if !info.subnets.iter().any(|s| *s == requested) => {
                warn!(
                    network = name,
                    requested = %requested,
                    actual = ?info.subnets,
                    "Network exists with a different subnet; leaving it unchanged"
                );
                Ok(NetworkOutcome::SubnetMismatch {
                    requested,
                    actual: info.subnets,
                })
            }
            _ => {
                info!(network = name, "Network already exists");
                Ok(NetworkOutcome::Existing)
            }
        };
    }

    runtime
        .create_network(&NetworkSpec {
            name: name.to_string(),
            subnet: requested.clone(),
        })
        .await
        .map_err(|e| StackError::Provision(e.to_string()))?;

    info!(
        network = name,
        subnet = requested.as_deref().unwrap_or("runtime default"),
        "Network created"
    );
    Ok(NetworkOutcome::Created)
}

/// Create every missing directory under `root`, parents included.
pub fn ensure_directories(
    root: &Path,
    subpaths: &[PathBuf],
) -> Result<Vec<(PathBuf, StepOutcome)>, StackError> {
    let mut results = Vec::with_capacity(subpaths.len() + 1);

    for path in std::iter::once(root.to_path_buf()).chain(subpaths.iter().map(|p| root.join(p))) {
        if path.is_dir() {
            results.push((path, StepOutcome::AlreadySatisfied("present".to_string())));
            continue;
        }
        std::fs::create_dir_all(&path).map_err(|e| {
            StackError::Provision(format!("Failed to create directory {}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Directory created");
        results.push((path, StepOutcome::Completed));
    }

    Ok(results)
}

/// Restrict a directory holding credentials to its owner.
#[cfg(unix)]
pub fn restrict_to_owner(path: &Path) -> Result<(), StackError> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|e| {
        StackError::Provision(format!("Failed to restrict {}: {}", path.display(), e))
    })
}

#[cfg(not(unix))]
pub fn restrict_to_owner(_path: &Path) -> Result<(), StackError> {
    Ok(())
}
