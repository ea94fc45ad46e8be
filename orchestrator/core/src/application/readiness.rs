// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Readiness Prober
//!
//! Polls a service's readiness check at a fixed interval until it succeeds
//! or the attempt budget is spent. The wait blocks the calling sequence.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::errors::StackError;
use crate::domain::runtime::ContainerRuntime;
use crate::domain::service::{ReadinessCheck, ServiceDescriptor};
use crate::domain::stack_config::Timings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl From<&Timings> for RetryPolicy {
    fn from(timings: &Timings) -> Self {
        Self {
            max_attempts: timings.probe_attempts,
            interval: timings.probe_interval,
        }
    }
}

pub struct ReadinessProber<'a> {
    runtime: &'a dyn ContainerRuntime,
}

impl<'a> ReadinessProber<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime) -> Self {
        Self { runtime }
    }

    /// Returns the attempt number that succeeded.
    ///
    /// Makes exactly `policy.max_attempts` attempts before giving up, with
    /// `policy.interval` between consecutive attempts. A failed exec counts
    /// as a failed attempt.
    pub async fn wait_ready(
        &self,
        service: &ServiceDescriptor,
        check: &ReadinessCheck,
        policy: RetryPolicy,
    ) -> Result<u32, StackError> {
        for attempt in 1..=policy.max_attempts {
            match self.runtime.exec(&service.name, &check.command).await {
                Ok(output) if check.is_satisfied(output.exit_code, &output.stdout) => {
                    info!(service = %service.name, attempt, "Service is ready");
                    return Ok(attempt);
                }
                Ok(output) => {
                    debug!(
                        service = %service.name,
                        attempt,
                        exit_code = output.exit_code,
                        "Readiness check not yet satisfied"
                    );
                }
                Err(e) => {
                    debug!(service = %service.name, attempt, error = %e, "Readiness check errored");
                }
            }

            if attempt < policy.max_attempts {
                tokio::time::sleep(policy.interval).await;
            }
        }

        warn!(
            service = %service.name,
            attempts = policy.max_attempts,
            "Service did not become ready"
        );
        Err(StackError::ReadinessTimeout {
            service: service.name.clone(),
            attempts: policy.max_attempts,
        })
    }
}
