// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Dependency graph between service descriptors
//!
//! Startup order, teardown order and the unit files' `After=`/`BindsTo=`
//! relations are all derived from this graph, so the dependency semantics
//! are testable independently of any rendering.

use std::collections::{HashMap, HashSet};

use crate::domain::errors::StackError;
use crate::domain::service::{ServiceDescriptor, ServiceKind};

#[derive(Debug, Clone)]
pub struct StackGraph {
    services: Vec<ServiceDescriptor>,
    order: Vec<usize>,
}

impl StackGraph {
    /// Validate the edges and compute a deterministic startup order.
    pub fn new(services: Vec<ServiceDescriptor>) -> Result<Self, StackError> {
        let index: HashMap<&str, usize> = services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();
        if index.len() != services.len() {
            return Err(StackError::InvalidGraph(
                "Duplicate service names in stack".to_string(),
            ));
        }

        let mut in_degree = vec![0usize; services.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); services.len()];
        for (i, service) in services.iter().enumerate() {
            for dep in &service.depends_on {
                let Some(&d) = index.get(dep.as_str()) else {
                    return Err(StackError::InvalidGraph(format!(
                        "Service {} depends on non-existent service {}",
                        service.name, dep
                    )));
                };
                dependents[d].push(i);
                in_degree[i] += 1;
            }
        }

        Self::check_application_edges(&services)?;

        // Kahn's algorithm; the ready set is kept in declaration order
        let mut ready: Vec<usize> = (0..services.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(services.len());
        while !ready.is_empty() {
            let node = ready.remove(0);
            order.push(node);
            for &next in &dependents[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    let pos = ready.partition_point(|&r| r < next);
                    ready.insert(pos, next);
                }
            }
        }

        if order.len() != services.len() {
            return Err(StackError::InvalidGraph(
                "Circular dependency detected in service dependencies".to_string(),
            ));
        }

        Ok(Self { services, order })
    }

    fn check_application_edges(services: &[ServiceDescriptor]) -> Result<(), StackError> {
        let names_of = |kind: ServiceKind| -> Vec<&str> {
            services
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| s.name.as_str())
                .collect()
        };
        let datastores = names_of(ServiceKind::Datastore);
        let caches = names_of(ServiceKind::Cache);

        for app in services.iter().filter(|s| s.kind == ServiceKind::Application) {
            let deps: HashSet<&str> = app.depends_on.iter().map(|d| d.as_str()).collect();
            let has_datastore = datastores.iter().any(|d| deps.contains(d));
            let has_cache = caches.iter().any(|c| deps.contains(c));
            if !has_datastore || !has_cache {
                return Err(StackError::InvalidGraph(format!(
                    "Application {} must depend on both the datastore and the cache",
                    app.name
                )));
            }
        }
        Ok(())
    }

    /// Services in an order where every dependency precedes its dependents.
    pub fn startup_order(&self) -> Vec<&ServiceDescriptor> {
        self.order.iter().map(|&i| &self.services[i]).collect()
    }

    /// Reverse of [`startup_order`](Self::startup_order).
    pub fn teardown_order(&self) -> Vec<&ServiceDescriptor> {
        self.order.iter().rev().map(|&i| &self.services[i]).collect()
    }

    /// Startup order restricted to the given layers.
    pub fn layers(&self, kinds: &[ServiceKind]) -> Vec<&ServiceDescriptor> {
        self.startup_order()
            .into_iter()
            .filter(|s| kinds.contains(&s.kind))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn by_kind(&self, kind: ServiceKind) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.kind == kind)
    }

    /// Direct dependencies of a service, in declared order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&ServiceDescriptor> {
        self.get(name)
            .map(|s| s.depends_on.iter().filter_map(|d| self.get(d)).collect())
            .unwrap_or_default()
    }

    pub fn services(&self) -> &[ServiceDescriptor] {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::service::{Readiness, RestartPolicy};
    use std::collections::BTreeMap;

    fn service(name: &str, kind: ServiceKind, depends_on: &[&str]) -> ServiceDescriptor {
        ServiceDescriptor {
            name: name.to_string(),
            kind,
            description: String::new(),
            image: "img:1".to_string(),
            network: "net".to_string(),
            address: None,
            ports: Vec::new(),
            mounts: Vec::new(),
            environment: BTreeMap::new(),
            command: Vec::new(),
            depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
            restart: RestartPolicy::Always,
            auto_start: true,
            readiness: Readiness::SettleOnly,
            post_ready: Vec::new(),
        }
    }

    fn names(services: Vec<&ServiceDescriptor>) -> Vec<&str> {
        services.into_iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_application_starts_last_even_when_declared_first() {
        let graph = StackGraph::new(vec![
            service("app", ServiceKind::Application, &["db", "cache"]),
            service("db", ServiceKind::Datastore, &[]),
            service("cache", ServiceKind::Cache, &[]),
        ])
        .unwrap();

        assert_eq!(names(graph.startup_order()), vec!["db", "cache", "app"]);
        assert_eq!(names(graph.teardown_order()), vec!["app", "cache", "db"]);
        assert_eq!(names(graph.dependencies_of("app")), vec!["db", "cache"]);
    }

    #[test]
    fn test_layers_filter_keeps_order() {
        let graph = StackGraph::new(vec![
            service("db", ServiceKind::Datastore, &[]),
            service("cache", ServiceKind::Cache, &[]),
            service("app", ServiceKind::Application, &["db", "cache"]),
        ])
        .unwrap();

        let layers = graph.layers(&[ServiceKind::Datastore, ServiceKind::Cache]);
        assert_eq!(names(layers), vec!["db", "cache"]);
    }

    #[test]
    fn test_application_missing_cache_edge_rejected() {
        let result = StackGraph::new(vec![
            service("db", ServiceKind::Datastore, &[]),
            service("cache", ServiceKind::Cache, &[]),
            service("app", ServiceKind::Application, &["db"]),
        ]);
        assert!(matches!(result, Err(StackError::InvalidGraph(_))));
    }

    #[test]
    fn test_unknown_dependency_rejected() {
        let result = StackGraph::new(vec![service("db", ServiceKind::Datastore, &["ghost"])]);
        assert!(matches!(result, Err(StackError::InvalidGraph(msg)) if msg.contains("ghost")));
    }

    #[test]
    fn test_cycle_rejected() {
        let result = StackGraph::new(vec![
            service("a", ServiceKind::Datastore, &["b"]),
            service("b", ServiceKind::Cache, &["a"]),
        ]);
        assert!(matches!(result, Err(StackError::InvalidGraph(msg)) if msg.contains("Circular")));
    }
}
