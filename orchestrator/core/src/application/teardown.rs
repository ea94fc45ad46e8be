// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Teardown Coordinator
//!
//! Removes everything install created, in reverse dependency order. Steps
//! whose target is already gone are recorded and skipped: a unit that is not
//! loaded, a container that is absent or stopped, and an init system whose
//! control channel cannot be reached. Any other failure aborts teardown
//! before the data root is considered. Deleting the data root is the one irreversible
//! step and always waits for an explicit operator answer.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::errors::StackError;
use crate::domain::graph::StackGraph;
use crate::domain::init_system::{InitSystem, InitSystemError, UnitStop};
use crate::domain::operator::Operator;
use crate::domain::outcome::{StepOutcome, StepRecord};
use crate::domain::runtime::{ContainerRuntime, RemoveStatus, StopStatus};
use crate::domain::stack_config::StackPaths;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub steps: Vec<StepRecord>,
}

impl TeardownReport {
    fn record(&mut self, step: impl Into<String>, outcome: StepOutcome) {
        let record = StepRecord::new(step, outcome);
        match &record.outcome {
            StepOutcome::Completed => info!(step = %record.step, "Teardown step completed"),
            other => info!(step = %record.step, outcome = %other, "Teardown step skipped"),
        }
        self.steps.push(record);
    }

    pub fn outcome_of(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }

    /// Whether the data root was deleted.
    pub fn data_removed(&self) -> bool {
        self.steps
            .iter()
            .any(|r| r.step.starts_with("delete data root") && r.outcome.is_completed())
    }
}

pub struct TeardownCoordinator<'a> {
    runtime: &'a dyn ContainerRuntime,
    init: &'a dyn InitSystem,
    operator: &'a dyn Operator,
    unit_dir: PathBuf,
    transient: Vec<String>,
}

impl<'a> TeardownCoordinator<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        init: &'a dyn InitSystem,
        operator: &'a dyn Operator,
        unit_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runtime,
            init,
            operator,
            unit_dir: unit_dir.into(),
            transient: Vec::new(),
        }
    }

    /// Containers outside the graph that install may have left behind,
    /// such as an interrupted config editor. Removed before the graph's.
    pub fn with_transient_containers(mut self, names: Vec<String>) -> Self {
        self.transient = names;
        self
    }

    pub async fn tear_down(&self, graph: &StackGraph, paths: &StackPaths) -> Result<TeardownReport, StackError> {
        let mut report = TeardownReport::default();
        let order = graph.teardown_order();

        for name in &self.transient {
            let status = self.runtime.remove(name).await?;
            report.record(format!("remove container {}", name), removal_outcome(status));
        }

        for service in &order {
            let unit = service.unit_name();
            let outcome = match self.init.stop(&unit).await {
                Ok(UnitStop::Stopped) => StepOutcome::Completed,
                Ok(UnitStop::NotLoaded) => StepOutcome::AlreadySatisfied("unit not loaded".to_string()),
                Err(InitSystemError::ChannelUnreachable(reason)) => {
                    warn!(unit = %unit, reason = %reason, "Init system unreachable; skipping unit stop");
                    StepOutcome::Tolerated(format!("control channel unreachable: {}", reason))
                }
                Err(e) => return Err(e.into()),
            };
            report.record(format!("stop unit {}", unit), outcome);

            let outcome = match self.runtime.stop(&service.name).await? {
                StopStatus::Stopped => StepOutcome::Completed,
                StopStatus::AlreadyStopped => StepOutcome::AlreadySatisfied("already stopped".to_string()),
                StopStatus::Absent => StepOutcome::AlreadySatisfied("container absent".to_string()),
            };
            report.record(format!("stop container {}", service.name), outcome);
        }

        for service in &order {
            let status = self.runtime.remove(&service.name).await?;
            report.record(format!("remove container {}", service.name), removal_outcome(status));
        }

        if self.unit_dir.is_dir() {
            for service in &order {
                let path = self.unit_dir.join(service.unit_file_name());
                report.record(format!("delete {}", path.display()), remove_file(&path)?);
            }
        } else {
            report.record(
                format!("delete unit files in {}", self.unit_dir.display()),
                StepOutcome::AlreadySatisfied("unit directory missing".to_string()),
            );
        }
        for service in order.iter().filter(|s| !s.environment.is_empty()) {
            let path = paths.env.join(service.env_file_name());
            report.record(format!("delete {}", path.display()), remove_file(&path)?);
        }

        let outcome = match self.init.reload().await {
            Ok(()) => StepOutcome::Completed,
            Err(InitSystemError::ChannelUnreachable(reason)) => {
                warn!(reason = %reason, "Init system unreachable; skipping reload");
                StepOutcome::Tolerated(format!("control channel unreachable: {}", reason))
            }
            Err(e) => return Err(e.into()),
        };
        report.record("reload init system", outcome);

        let networks: BTreeSet<&str> = order.iter().map(|s| s.network.as_str()).collect();
        for network in networks {
            let status = self.runtime.remove_network(network).await?;
            report.record(format!("remove network {}", network), removal_outcome(status));
        }

        let step = format!("delete data root {}", paths.root.display());
        let outcome = self.confirm_and_delete(&paths.root)?;
        report.record(step, outcome);

        Ok(report)
    }

    fn confirm_and_delete(&self, root: &Path) -> Result<StepOutcome, StackError> {
        if !root.exists() {
            return Ok(StepOutcome::AlreadySatisfied("data root absent".to_string()));
        }

        let prompt = format!(
            "Permanently delete {} including all registry data?",
            root.display()
        );
        if !self.operator.confirm(&prompt)? {
            return Ok(StepOutcome::Declined(format!("{} kept", root.display())));
        }

        std::fs::remove_dir_all(root).map_err(|e| {
            StackError::Teardown(format!("Failed to delete {}: {}", root.display(), e))
        })?;
        Ok(StepOutcome::Completed)
    }
}

fn removal_outcome(status: RemoveStatus) -> StepOutcome {
    match status {
        RemoveStatus::Removed => StepOutcome::Completed,
        RemoveStatus::Absent => StepOutcome::AlreadySatisfied("absent".to_string()),
    }
}

fn remove_file(path: &Path) -> Result<StepOutcome, StackError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(StepOutcome::Completed),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok(StepOutcome::AlreadySatisfied("file absent".to_string()))
        }
        Err(e) => Err(StackError::Teardown(format!(
            "Failed to delete {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_file_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quay-registry.container");
        assert_eq!(
            remove_file(&path).unwrap(),
            StepOutcome::AlreadySatisfied("file absent".to_string())
        );

        std::fs::write(&path, "[Unit]\n").unwrap();
        assert_eq!(remove_file(&path).unwrap(), StepOutcome::Completed);
        assert!(!path.exists());
    }
}
