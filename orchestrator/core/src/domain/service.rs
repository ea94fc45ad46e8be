// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service descriptors for the three stack layers
//!
//! A [`ServiceDescriptor`] is the single description of a managed container
//! that the sequencer starts, the prober checks, the unit generator renders
//! and teardown stops. Descriptors are built from a validated
//! [`StackConfig`]; nothing else constructs them in production code.

use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use crate::domain::stack_config::StackConfig;

/// Extension the registry requires in its database.
pub const DATASTORE_EXTENSION: &str = "pg_trgm";

/// Port the datastore listens on inside the network.
pub const DATASTORE_PORT: u16 = 5432;

/// Port the cache listens on inside the network.
pub const CACHE_PORT: u16 = 6379;

/// Token the cache's liveness command answers with.
pub const CACHE_READY_TOKEN: &str = "PONG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Datastore,
    Cache,
    Application,
    /// Transient registry instance in configuration mode, only alive during the checkpoint
    ConfigEditor,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceKind::Datastore => "datastore",
            ServiceKind::Cache => "cache",
            ServiceKind::Application => "application",
            ServiceKind::ConfigEditor => "config-editor",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub host: u16,
    pub container: u16,
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.container)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    ReadOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub host: PathBuf,
    pub container: String,
    pub mode: AccessMode,
}

impl Mount {
    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            container: container.into(),
            mode: AccessMode::ReadWrite,
        }
    }

    /// `host:container:options`, relabelled for a private SELinux context.
    pub fn to_bind(&self) -> String {
        let options = match self.mode {
            AccessMode::ReadWrite => "Z",
            AccessMode::ReadOnly => "ro,Z",
        };
        format!("{}:{}:{}", self.host.display(), self.container, options)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    Always,
    OnFailure,
    No,
}

impl RestartPolicy {
    pub fn as_unit_value(&self) -> &'static str {
        match self {
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::No => "no",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessCriterion {
    ExitZero,
    /// Zero exit and the token appears in stdout
    OutputContains(String),
}

/// Read-only probe executed inside the service's container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessCheck {
    pub command: Vec<String>,
    pub criterion: SuccessCriterion,
}

impl ReadinessCheck {
    pub fn is_satisfied(&self, exit_code: i64, stdout: &str) -> bool {
        match &self.criterion {
            SuccessCriterion::ExitZero => exit_code == 0,
            SuccessCriterion::OutputContains(token) => exit_code == 0 && stdout.contains(token.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Probe(ReadinessCheck),
    /// No probe exists; the sequencer waits a fixed settle delay instead.
    /// This is a weaker guarantee than `Probe` and is reported as such.
    SettleOnly,
}

#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub kind: ServiceKind,
    pub description: String,
    pub image: String,
    pub network: String,
    pub address: Option<Ipv4Addr>,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<Mount>,
    /// Rendered to a per-service env file referenced by the unit
    pub environment: BTreeMap<String, String>,
    pub command: Vec<String>,
    /// Services that must be ready, not merely started, before this one
    pub depends_on: Vec<String>,
    pub restart: RestartPolicy,
    pub auto_start: bool,
    pub readiness: Readiness,
    /// One-shot commands run inside the container once it is ready
    pub post_ready: Vec<Vec<String>>,
}

impl ServiceDescriptor {
    /// Derived systemd unit name produced from this service's Quadlet file.
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.name)
    }

    pub fn unit_file_name(&self) -> String {
        format!("{}.container", self.name)
    }

    pub fn env_file_name(&self) -> String {
        format!("{}.env", self.name)
    }
}

/// Descriptors for the datastore, cache and application, in declaration order.
pub fn stack_services(config: &StackConfig) -> Vec<ServiceDescriptor> {
    let datastore = &config.datastore;
    let cache = &config.cache;
    let app = &config.application;

    let datastore_name = config.datastore_name();
    let cache_name = config.cache_name();

    let datastore_env = BTreeMap::from([
        ("POSTGRES_DB".to_string(), datastore.database.clone()),
        ("POSTGRES_USER".to_string(), datastore.user.clone()),
        ("POSTGRES_PASSWORD".to_string(), datastore.password.expose().to_string()),
    ]);

    // The password reaches the cache only through its environment, so it
    // never appears in a unit file or a process listing.
    let cache_env = BTreeMap::from([
        ("REDIS_PASSWORD".to_string(), cache.password.expose().to_string()),
        ("REDISCLI_AUTH".to_string(), cache.password.expose().to_string()),
    ]);

    let psql = |sql: &str| -> Vec<String> {
        vec![
            "psql".to_string(),
            "-U".to_string(),
            datastore.user.clone(),
            "-d".to_string(),
            datastore.database.clone(),
            "-tAc".to_string(),
            sql.to_string(),
        ]
    };

    vec![
        ServiceDescriptor {
            name: datastore_name.clone(),
            kind: ServiceKind::Datastore,
            description: "Registry PostgreSQL datastore".to_string(),
            image: format!("{}:{}", datastore.image, datastore.version),
            network: config.network.name.clone(),
            address: datastore.address,
            ports: Vec::new(),
            mounts: vec![Mount::read_write(
                &config.paths.datastore_data,
                "/var/lib/postgresql/data",
            )],
            environment: datastore_env,
            command: Vec::new(),
            depends_on: Vec::new(),
            restart: RestartPolicy::Always,
            auto_start: true,
            readiness: Readiness::Probe(ReadinessCheck {
                command: psql("SELECT 1"),
                criterion: SuccessCriterion::ExitZero,
            }),
            post_ready: vec![psql(&format!(
                "CREATE EXTENSION IF NOT EXISTS {};",
                DATASTORE_EXTENSION
            ))],
        },
        ServiceDescriptor {
            name: cache_name.clone(),
            kind: ServiceKind::Cache,
            description: "Registry Redis cache".to_string(),
            image: format!("{}:{}", cache.image, cache.version),
            network: config.network.name.clone(),
            address: cache.address,
            ports: Vec::new(),
            mounts: Vec::new(),
            environment: cache_env,
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                "exec redis-server --requirepass \"$REDIS_PASSWORD\"".to_string(),
            ],
            depends_on: Vec::new(),
            restart: RestartPolicy::Always,
            auto_start: true,
            readiness: Readiness::Probe(ReadinessCheck {
                command: vec!["redis-cli".to_string(), "ping".to_string()],
                criterion: SuccessCriterion::OutputContains(CACHE_READY_TOKEN.to_string()),
            }),
            post_ready: Vec::new(),
        },
        ServiceDescriptor {
            name: config.application_name(),
            kind: ServiceKind::Application,
            description: "Container registry".to_string(),
            image: format!("{}:{}", app.image, app.version),
            network: config.network.name.clone(),
            address: app.address,
            ports: application_ports(config),
            mounts: vec![
                Mount::read_write(&config.paths.config, "/conf/stack"),
                Mount::read_write(&config.paths.storage, "/datastorage"),
            ],
            environment: BTreeMap::new(),
            command: Vec::new(),
            depends_on: vec![datastore_name, cache_name],
            restart: RestartPolicy::Always,
            auto_start: true,
            readiness: Readiness::SettleOnly,
            post_ready: Vec::new(),
        },
    ]
}

/// Registry in configuration mode, serving the config editor over HTTP.
///
/// Returns `None` unless an editor password is configured.
pub fn config_editor(config: &StackConfig) -> Option<ServiceDescriptor> {
    let password = config.application.config_editor_password.as_ref()?;
    Some(ServiceDescriptor {
        name: config.config_editor_name(),
        kind: ServiceKind::ConfigEditor,
        description: "Registry configuration editor".to_string(),
        image: format!("{}:{}", config.application.image, config.application.version),
        network: config.network.name.clone(),
        address: None,
        ports: vec![PortMapping {
            host: config.application.http_port,
            container: 8080,
        }],
        mounts: Vec::new(),
        environment: BTreeMap::new(),
        command: vec!["config".to_string(), password.expose().to_string()],
        depends_on: Vec::new(),
        restart: RestartPolicy::No,
        auto_start: false,
        readiness: Readiness::SettleOnly,
        post_ready: Vec::new(),
    })
}

fn application_ports(config: &StackConfig) -> Vec<PortMapping> {
    vec![
        PortMapping {
            host: config.application.http_port,
            container: 8080,
        },
        PortMapping {
            host: config.application.https_port,
            container: 8443,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    fn config(extra: &[(&str, &str)]) -> StackConfig {
        let mut values: HashMap<String, String> = [
            ("POSTGRES_DB", "quay"),
            ("POSTGRES_USER", "quayuser"),
            ("POSTGRES_PASSWORD", "secret"),
            ("POSTGRES_VERSION", "15"),
            ("REDIS_PASSWORD", "redispass"),
            ("REDIS_VERSION", "7"),
            ("QUAY_VERSION", "v3.12.0"),
            ("NETWORK_NAME", "app-net"),
            ("QUAY_ROOT", "/srv/quay"),
            ("UNIT_DIR", "/tmp/units"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        for (k, v) in extra {
            values.insert(k.to_string(), v.to_string());
        }
        StackConfig::from_values(Path::new("stack.env"), &values).unwrap()
    }

    #[test]
    fn test_application_depends_on_datastore_and_cache() {
        let services = stack_services(&config(&[]));
        let app = services
            .iter()
            .find(|s| s.kind == ServiceKind::Application)
            .unwrap();

        assert_eq!(app.depends_on, vec!["quay-postgres".to_string(), "quay-redis".to_string()]);
        assert_eq!(app.readiness, Readiness::SettleOnly);
        assert_eq!(app.ports[0].to_string(), "8080:8080");
    }

    #[test]
    fn test_probes_are_bound_to_credentials() {
        let services = stack_services(&config(&[]));

        let Readiness::Probe(datastore_check) = &services[0].readiness else {
            panic!("datastore must be probed");
        };
        assert_eq!(datastore_check.criterion, SuccessCriterion::ExitZero);
        assert!(datastore_check.command.contains(&"quayuser".to_string()));

        let Readiness::Probe(cache_check) = &services[1].readiness else {
            panic!("cache must be probed");
        };
        assert!(!cache_check.command.contains(&"redispass".to_string()));
        assert_eq!(
            services[1].environment.get("REDISCLI_AUTH").map(String::as_str),
            Some("redispass")
        );
        assert!(!services[1].command.iter().any(|arg| arg.contains("redispass")));
        assert!(cache_check.is_satisfied(0, "PONG\n"));
        assert!(!cache_check.is_satisfied(0, "NOAUTH Authentication required.\n"));
        assert!(!cache_check.is_satisfied(1, "PONG\n"));
    }

    #[test]
    fn test_datastore_enables_extension_after_ready() {
        let services = stack_services(&config(&[]));
        let hook = services[0].post_ready[0].join(" ");
        assert!(hook.contains("CREATE EXTENSION IF NOT EXISTS pg_trgm"));
    }

    #[test]
    fn test_mount_binds() {
        let services = stack_services(&config(&[]));
        assert_eq!(
            services[0].mounts[0].to_bind(),
            "/srv/quay/postgres:/var/lib/postgresql/data:Z"
        );
        let ro = Mount {
            host: PathBuf::from("/a"),
            container: "/b".to_string(),
            mode: AccessMode::ReadOnly,
        };
        assert_eq!(ro.to_bind(), "/a:/b:ro,Z");
    }

    #[test]
    fn test_config_editor_only_with_password() {
        assert!(config_editor(&config(&[])).is_none());

        let editor = config_editor(&config(&[("CONFIG_EDITOR_PASSWORD", "editme")])).unwrap();
        assert_eq!(editor.name, "quay-config-editor");
        assert_eq!(editor.command, vec!["config".to_string(), "editme".to_string()]);
    }
}
