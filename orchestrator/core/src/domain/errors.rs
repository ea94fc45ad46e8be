// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::init_system::InitSystemError;
use crate::domain::runtime::RuntimeError;
use crate::domain::stack_config::ConfigError;

/// Fatal conditions of the install, start and teardown workflows.
///
/// Any of these terminates the workflow; retrying is always a full
/// re-invocation that relies on idempotent provisioning.
#[derive(Debug, Error)]
pub enum StackError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Provisioning failed: {0}")]
    Provision(String),

    #[error("Invalid service graph: {0}")]
    InvalidGraph(String),

    #[error("Service {service} did not become ready after {attempts} attempts")]
    ReadinessTimeout { service: String, attempts: u32 },

    #[error("Refusing to start {service}: dependency {dependency} is not ready")]
    OrderViolation { service: String, dependency: String },

    #[error("Post-start command failed in {service}: {message}")]
    PostStartHook { service: String, message: String },

    #[error("Checkpoint artifact not found at {0}; place it there and re-run install")]
    CheckpointArtifactMissing(PathBuf),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Unit generation failed: {0}")]
    GeneratorFailure(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    InitSystem(#[from] InitSystemError),

    #[error("Operator interaction failed: {0}")]
    Operator(String),

    #[error("Teardown failed: {0}")]
    Teardown(String),
}

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("Failed to unpack {archive}: {reason}")]
    UnpackFailure { archive: PathBuf, reason: String },

    #[error("Settings file {0} missing after unpacking")]
    MissingSettingsFile(PathBuf),

    #[error("Failed to rewrite {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
