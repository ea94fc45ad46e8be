// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stack Workflows
//!
//! Application service driving install, start, teardown and status for one
//! stack.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Run each workflow as a strict sequence of steps
//! - **Collaborators:**
//!   - Domain: StackConfig, StackGraph, ServiceDescriptor
//!   - Infrastructure: ContainerRuntime, InitSystem, Operator (trait objects)
//!
//! # Install flow
//!
//! 1. Provision the network and data directories
//! 2. Bring up the datastore, then the cache, each gated on readiness
//! 3. Launch the config editor when one is configured
//! 4. Checkpoint: the operator builds the configuration bundle
//! 5. Remove the config editor
//! 6. Unpack and patch the bundle
//! 7. Generate unit definitions and activate the application unit
//!
//! # Error Handling
//!
//! Returns anyhow::Error whose context names the failed step, wrapping the
//! underlying [`StackError`]. Nothing is rolled back: every step is
//! idempotent, so recovery is a full re-invocation.

use anyhow::{Context, Result};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::checkpoint::CheckpointCoordinator;
use crate::application::patcher::{ConfigPatcher, PatchReport, PatchRules};
use crate::application::provisioner::{self, NetworkOutcome};
use crate::application::sequencer::{AddressBook, DependencySequencer};
use crate::application::teardown::{TeardownCoordinator, TeardownReport};
use crate::application::unit_generator::UnitGenerator;
use crate::domain::errors::{PatchError, StackError};
use crate::domain::graph::StackGraph;
use crate::domain::init_system::InitSystem;
use crate::domain::operator::Operator;
use crate::domain::outcome::StepOutcome;
use crate::domain::runtime::{ContainerRuntime, RemoveStatus};
use crate::domain::service::{self, ServiceDescriptor, ServiceKind};
use crate::domain::stack_config::StackConfig;

/// What install did, step by step.
#[derive(Debug, Clone)]
pub struct InstallSummary {
    pub network: NetworkOutcome,
    pub directories: Vec<(PathBuf, StepOutcome)>,
    pub addresses: AddressBook,
    pub editor_removal: Option<StepOutcome>,
    pub artifact: PathBuf,
    pub patch: PatchReport,
    pub archive_removal: Option<StepOutcome>,
    pub units: Vec<PathBuf>,
    pub activated_unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub kind: ServiceKind,
    /// `None` when the container does not exist
    pub container_state: Option<String>,
    pub address: Option<Ipv4Addr>,
    pub unit_state: String,
}

pub struct StackOrchestrator {
    config: StackConfig,
    graph: StackGraph,
    runtime: Arc<dyn ContainerRuntime>,
    init: Arc<dyn InitSystem>,
    operator: Arc<dyn Operator>,
}

impl StackOrchestrator {
    /// Build the service graph for `config`; fails if the graph is invalid.
    pub fn new(
        config: StackConfig,
        runtime: Arc<dyn ContainerRuntime>,
        init: Arc<dyn InitSystem>,
        operator: Arc<dyn Operator>,
    ) -> Result<Self, StackError> {
        let graph = StackGraph::new(service::stack_services(&config))?;
        Ok(Self {
            config,
            graph,
            runtime,
            init,
            operator,
        })
    }

    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn graph(&self) -> &StackGraph {
        &self.graph
    }

    fn unit_generator(&self) -> UnitGenerator<'_> {
        UnitGenerator::new(
            self.init.as_ref(),
            &self.config.unit_dir,
            &self.config.paths.env,
        )
    }

    fn application(&self) -> Result<&ServiceDescriptor, StackError> {
        self.graph
            .by_kind(ServiceKind::Application)
            .ok_or_else(|| StackError::InvalidGraph("Stack has no application service".to_string()))
    }

    async fn provision(&self) -> Result<(NetworkOutcome, Vec<(PathBuf, StepOutcome)>)> {
        let network = &self.config.network;
        let outcome = provisioner::ensure_network(self.runtime.as_ref(), &network.name, network.subnet)
            .await
            .with_context(|| format!("Provisioning network {}", network.name))?;

        let paths = &self.config.paths;
        let directories = provisioner::ensure_directories(&paths.root, &paths.subpaths())
            .with_context(|| format!("Provisioning directories under {}", paths.root.display()))?;
        provisioner::restrict_to_owner(&paths.env)
            .with_context(|| format!("Restricting {}", paths.env.display()))?;

        Ok((outcome, directories))
    }

    pub async fn install(&self) -> Result<InstallSummary> {
        info!(stack = %self.config.stack_name, "Installing stack");

        let (network, directories) = self.provision().await?;

        let sequencer = DependencySequencer::new(self.runtime.as_ref(), self.config.timings);
        let backing = self.graph.layers(&[ServiceKind::Datastore, ServiceKind::Cache]);
        let addresses = sequencer
            .bring_up(&backing)
            .await
            .context("Bringing up datastore and cache")?;

        let editor = service::config_editor(&self.config);
        if let Some(editor) = &editor {
            sequencer
                .bring_up(&[editor])
                .await
                .with_context(|| format!("Launching config editor {}", editor.name))?;
        }

        let checkpoint = CheckpointCoordinator::new(self.operator.as_ref());
        let gate = checkpoint
            .render_instructions(&self.config, &addresses, editor.as_ref())
            .and_then(|instructions| checkpoint.run_checkpoint(&instructions, &self.config.checkpoint.archive));

        let editor_removal = match &editor {
            Some(editor) => Some(self.remove_editor(editor).await),
            None => None,
        };
        let artifact = gate.context("Waiting for configuration bundle")?;

        let patch = ConfigPatcher::new(&self.config.paths.config)
            .patch(&artifact, &PatchRules::default())
            .map_err(StackError::from)
            .with_context(|| format!("Patching configuration from {}", artifact.display()))?;

        let archive_removal = if self.config.checkpoint.remove_archive {
            Some(match std::fs::remove_file(&artifact) {
                Ok(()) => StepOutcome::Completed,
                Err(e) => {
                    warn!(archive = %artifact.display(), error = %e, "Could not remove configuration bundle");
                    StepOutcome::Tolerated(e.to_string())
                }
            })
        } else {
            None
        };

        let generator = self.unit_generator();
        let units = generator
            .generate(&self.graph)
            .context("Generating unit definitions")?;

        let application = self.application()?;
        generator
            .activate(application)
            .await
            .with_context(|| format!("Activating {}", application.unit_name()))?;

        info!(stack = %self.config.stack_name, "Stack installed");
        Ok(InstallSummary {
            network,
            directories,
            addresses,
            editor_removal,
            artifact,
            patch,
            archive_removal,
            units,
            activated_unit: application.unit_name(),
        })
    }

    async fn remove_editor(&self, editor: &ServiceDescriptor) -> StepOutcome {
        match self.runtime.remove(&editor.name).await {
            Ok(RemoveStatus::Removed) => StepOutcome::Completed,
            Ok(RemoveStatus::Absent) => StepOutcome::AlreadySatisfied("absent".to_string()),
            Err(e) => {
                warn!(container = %editor.name, error = %e, "Could not remove config editor");
                StepOutcome::Tolerated(e.to_string())
            }
        }
    }

    /// Start every layer through the runtime against an existing configuration.
    pub async fn start(&self) -> Result<AddressBook> {
        info!(stack = %self.config.stack_name, "Starting stack");

        self.provision().await?;

        let settings = self.config.paths.settings_file();
        if !settings.is_file() {
            return Err(StackError::from(PatchError::MissingSettingsFile(settings)))
                .context("Checking for patched configuration; run install first");
        }

        let sequencer = DependencySequencer::new(self.runtime.as_ref(), self.config.timings);
        let addresses = sequencer
            .bring_up(&self.graph.startup_order())
            .await
            .context("Bringing up stack")?;

        info!(stack = %self.config.stack_name, "Stack started");
        Ok(addresses)
    }

    pub async fn teardown(&self) -> Result<TeardownReport> {
        info!(stack = %self.config.stack_name, "Tearing down stack");

        let transient = service::config_editor(&self.config)
            .map(|editor| vec![editor.name])
            .unwrap_or_default();

        let report = TeardownCoordinator::new(
            self.runtime.as_ref(),
            self.init.as_ref(),
            self.operator.as_ref(),
            &self.config.unit_dir,
        )
        .with_transient_containers(transient)
        .tear_down(&self.graph, &self.config.paths)
        .await
        .context("Tearing down stack")?;

        info!(stack = %self.config.stack_name, data_removed = report.data_removed(), "Stack torn down");
        Ok(report)
    }

    /// Runtime and unit state of every service, in startup order.
    pub async fn status(&self) -> Result<Vec<ServiceStatus>> {
        let mut statuses = Vec::new();
        for service in self.graph.startup_order() {
            let container_state = self
                .runtime
                .state(&service.name)
                .await
                .with_context(|| format!("Inspecting {}", service.name))?;

            let address = match (&container_state, service.address) {
                (_, Some(fixed)) => Some(fixed),
                (Some(_), None) => self
                    .runtime
                    .address(&service.name, &service.network)
                    .await
                    .with_context(|| format!("Inspecting address of {}", service.name))?,
                (None, None) => None,
            };

            let unit_state = match self.init.active_state(&service.unit_name()).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(unit = %service.unit_name(), error = %e, "Could not query unit state");
                    "unknown".to_string()
                }
            };

            statuses.push(ServiceStatus {
                name: service.name.clone(),
                kind: service.kind,
                container_state,
                address,
                unit_state,
            });
        }
        Ok(statuses)
    }
}
