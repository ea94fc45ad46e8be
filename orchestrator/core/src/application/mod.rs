// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod provisioner;
pub mod readiness;
pub mod sequencer;
pub mod checkpoint;
pub mod patcher;
pub mod unit_generator;
pub mod teardown;
pub mod workflow;

// Re-export workflow entry points for convenience
pub use workflow::{InstallSummary, ServiceStatus, StackOrchestrator};
pub use teardown::TeardownReport;
