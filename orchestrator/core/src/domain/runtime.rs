// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::net::Ipv4Addr;
use thiserror::Error;

use crate::domain::service::ServiceDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    /// CIDR; `None` leaves address allocation to the runtime
    pub subnet: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub name: String,
    pub subnets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Stopped,
    AlreadyStopped,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveStatus {
    Removed,
    Absent,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to connect to container runtime: {0}")]
    Connection(String),
    #[error("Failed to start container {name}: {message}")]
    StartFailed { name: String, message: String },
    #[error("Failed to execute command in {name}: {message}")]
    ExecutionFailed { name: String, message: String },
    #[error("Failed to stop {name}: {message}")]
    TerminationFailed { name: String, message: String },
    #[error("Network operation on {name} failed: {message}")]
    NetworkFailed { name: String, message: String },
    #[error("Failed to inspect {name}: {message}")]
    InspectFailed { name: String, message: String },
}

/// Calls the orchestrator issues against the container runtime.
///
/// Every call is awaited to completion before the workflow proceeds.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn inspect_network(&self, name: &str) -> Result<Option<NetworkInfo>, RuntimeError>;
    async fn create_network(&self, spec: &NetworkSpec) -> Result<(), RuntimeError>;
    async fn remove_network(&self, name: &str) -> Result<RemoveStatus, RuntimeError>;

    /// Create and start the service's container, discarding any existing
    /// container with the same name.
    async fn run(&self, service: &ServiceDescriptor) -> Result<(), RuntimeError>;

    async fn exec(&self, container: &str, command: &[String]) -> Result<ExecOutput, RuntimeError>;
    async fn stop(&self, container: &str) -> Result<StopStatus, RuntimeError>;
    async fn remove(&self, container: &str) -> Result<RemoveStatus, RuntimeError>;

    /// Address of the container on the given network, if attached.
    async fn address(&self, container: &str, network: &str) -> Result<Option<Ipv4Addr>, RuntimeError>;

    /// Runtime state such as `running` or `exited`; `None` when absent.
    async fn state(&self, container: &str) -> Result<Option<String>, RuntimeError>;
}
