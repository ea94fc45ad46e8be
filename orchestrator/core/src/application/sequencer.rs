// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dependency Sequencer
//!
//! Starts services one layer at a time, gating each on the readiness of the
//! layers before it. A readiness timeout aborts the sequence; services that
//! were already started are left running.

use std::collections::{BTreeMap, HashSet};
use std::net::Ipv4Addr;
use tracing::{info, warn};

use crate::application::readiness::{ReadinessProber, RetryPolicy};
use crate::domain::errors::StackError;
use crate::domain::runtime::ContainerRuntime;
use crate::domain::service::{Readiness, ServiceDescriptor};
use crate::domain::stack_config::Timings;

/// How a service's address became known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    Fixed,
    Allocated,
}

/// Addresses recorded while bringing services up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressBook {
    entries: BTreeMap<String, (Ipv4Addr, AddressSource)>,
}

impl AddressBook {
    pub fn record(&mut self, service: &str, address: Ipv4Addr, source: AddressSource) {
        self.entries.insert(service.to_string(), (address, source));
    }

    pub fn get(&self, service: &str) -> Option<Ipv4Addr> {
        self.entries.get(service).map(|(addr, _)| *addr)
    }

    pub fn source(&self, service: &str) -> Option<AddressSource> {
        self.entries.get(service).map(|(_, source)| *source)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Ipv4Addr)> {
        self.entries.iter().map(|(name, (addr, _))| (name.as_str(), *addr))
    }
}

pub struct DependencySequencer<'a> {
    runtime: &'a dyn ContainerRuntime,
    timings: Timings,
}

impl<'a> DependencySequencer<'a> {
    pub fn new(runtime: &'a dyn ContainerRuntime, timings: Timings) -> Self {
        Self { runtime, timings }
    }

    /// Start `services`, which must already be in dependency order.
    ///
    /// A service whose dependency has not been made ready earlier in the
    /// same call is refused with [`StackError::OrderViolation`].
    pub async fn bring_up(&self, services: &[&ServiceDescriptor]) -> Result<AddressBook, StackError> {
        let prober = ReadinessProber::new(self.runtime);
        let mut ready: HashSet<&str> = HashSet::new();
        let mut addresses = AddressBook::default();

        for service in services {
            if let Some(dep) = service.depends_on.iter().find(|d| !ready.contains(d.as_str())) {
                return Err(StackError::OrderViolation {
                    service: service.name.clone(),
                    dependency: dep.clone(),
                });
            }

            info!(service = %service.name, kind = %service.kind, image = %service.image, "Starting service");
            self.runtime.run(service).await?;

            match &service.readiness {
                Readiness::Probe(check) => {
                    tokio::time::sleep(self.timings.settle).await;
                    prober
                        .wait_ready(service, check, RetryPolicy::from(&self.timings))
                        .await?;
                    self.run_post_ready(service).await?;
                }
                Readiness::SettleOnly => {
                    tokio::time::sleep(self.timings.application_settle).await;
                    warn!(
                        service = %service.name,
                        settle_secs = self.timings.application_settle.as_secs(),
                        "No readiness probe for this service; assuming live after settle delay"
                    );
                }
            }

            self.record_address(service, &mut addresses).await;
            ready.insert(service.name.as_str());
        }

        Ok(addresses)
    }

    async fn run_post_ready(&self, service: &ServiceDescriptor) -> Result<(), StackError> {
        for command in &service.post_ready {
            let output = self
                .runtime
                .exec(&service.name, command)
                .await
                .map_err(|e| StackError::PostStartHook {
                    service: service.name.clone(),
                    message: e.to_string(),
                })?;
            if output.exit_code != 0 {
                return Err(StackError::PostStartHook {
                    service: service.name.clone(),
                    message: format!(
                        "exit code {}: {}",
                        output.exit_code,
                        output.stderr.trim()
                    ),
                });
            }
            info!(service = %service.name, "Post-start command completed");
        }
        Ok(())
    }

    async fn record_address(&self, service: &ServiceDescriptor, addresses: &mut AddressBook) {
        if let Some(fixed) = service.address {
            addresses.record(&service.name, fixed, AddressSource::Fixed);
            return;
        }
        match self.runtime.address(&service.name, &service.network).await {
            Ok(Some(addr)) => {
                info!(service = %service.name, address = %addr, "Recorded allocated address");
                addresses.record(&service.name, addr, AddressSource::Allocated);
            }
            Ok(None) => {
                warn!(service = %service.name, network = %service.network, "Service has no address on network");
            }
            Err(e) => {
                warn!(service = %service.name, error = %e, "Could not inspect service address");
            }
        }
    }
}
