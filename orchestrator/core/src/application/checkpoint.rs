// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Checkpoint Coordinator
//!
//! Hands the workflow to the operator: renders instructions carrying every
//! live value they need, blocks on their acknowledgement, then verifies the
//! artifact they were asked to produce. The wait is a blocking gate, not a
//! filesystem poll; a missing artifact after the gate is fatal.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::application::sequencer::AddressBook;
use crate::domain::errors::StackError;
use crate::domain::operator::Operator;
use crate::domain::service::{ServiceDescriptor, CACHE_PORT, DATASTORE_PORT};
use crate::domain::stack_config::StackConfig;
use crate::infrastructure::template_engine::{InstructionTemplateEngine, CHECKPOINT_TEMPLATE};

/// Login the registry's config editor expects.
pub const CONFIG_EDITOR_USER: &str = "quayconfig";

#[derive(Debug, Serialize)]
struct DatastoreContext {
    host: String,
    note: Option<String>,
    port: u16,
    database: String,
    user: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct CacheContext {
    host: String,
    note: Option<String>,
    port: u16,
    password: String,
}

#[derive(Debug, Serialize)]
struct EditorContext {
    url: String,
    user: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct CheckpointContext {
    datastore: DatastoreContext,
    cache: CacheContext,
    editor: Option<EditorContext>,
    artifact: String,
}

pub struct CheckpointCoordinator<'a> {
    operator: &'a dyn Operator,
    templates: InstructionTemplateEngine,
}

impl<'a> CheckpointCoordinator<'a> {
    pub fn new(operator: &'a dyn Operator) -> Self {
        Self {
            operator,
            templates: InstructionTemplateEngine::new(),
        }
    }

    /// Render operator instructions from live values.
    ///
    /// Hosts are the addresses recorded during bring-up; a service with no
    /// recorded address is referred to by its container name, which only the
    /// stack network resolves, and the host line says so.
    pub fn render_instructions(
        &self,
        config: &StackConfig,
        addresses: &AddressBook,
        editor: Option<&ServiceDescriptor>,
    ) -> Result<String, StackError> {
        let host_of = |name: String| -> (String, Option<String>) {
            match addresses.get(&name) {
                Some(addr) => (addr.to_string(), None),
                None => {
                    warn!(
                        service = %name,
                        network = %config.network.name,
                        "No address recorded; instructions refer to the container name"
                    );
                    let note = format!(
                        "container name, resolvable only on network {}",
                        config.network.name
                    );
                    (name, Some(note))
                }
            }
        };
        let (datastore_host, datastore_note) = host_of(config.datastore_name());
        let (cache_host, cache_note) = host_of(config.cache_name());

        let editor = match (editor, &config.application.config_editor_password) {
            (Some(editor), Some(password)) => {
                let port = editor
                    .ports
                    .first()
                    .map(|p| p.host)
                    .unwrap_or(config.application.http_port);
                Some(EditorContext {
                    url: format!("http://localhost:{}", port),
                    user: CONFIG_EDITOR_USER.to_string(),
                    password: password.expose().to_string(),
                })
            }
            _ => None,
        };

        let context = CheckpointContext {
            datastore: DatastoreContext {
                host: datastore_host,
                note: datastore_note,
                port: DATASTORE_PORT,
                database: config.datastore.database.clone(),
                user: config.datastore.user.clone(),
                password: config.datastore.password.expose().to_string(),
            },
            cache: CacheContext {
                host: cache_host,
                note: cache_note,
                port: CACHE_PORT,
                password: config.cache.password.expose().to_string(),
            },
            editor,
            artifact: config.checkpoint.archive.display().to_string(),
        };

        self.templates
            .render(CHECKPOINT_TEMPLATE, &context)
            .map_err(|e| StackError::Operator(format!("{:#}", e)))
    }

    /// Present the instructions, wait for the operator, then require the artifact.
    pub fn run_checkpoint(&self, instructions: &str, artifact: &Path) -> Result<PathBuf, StackError> {
        self.operator.present(instructions);
        info!(artifact = %artifact.display(), "Waiting for operator");
        self.operator
            .acknowledge("Press Enter once the configuration bundle is in place")?;

        if !artifact.is_file() {
            error!(artifact = %artifact.display(), "Checkpoint artifact missing after operator confirmation");
            return Err(StackError::CheckpointArtifactMissing(artifact.to_path_buf()));
        }

        info!(artifact = %artifact.display(), "Checkpoint artifact found");
        Ok(artifact.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::sequencer::AddressSource;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    struct Silent;

    impl Operator for Silent {
        fn present(&self, _text: &str) {}
        fn acknowledge(&self, _prompt: &str) -> Result<(), StackError> {
            Ok(())
        }
        fn confirm(&self, _prompt: &str) -> Result<bool, StackError> {
            Ok(false)
        }
    }

    fn config() -> StackConfig {
        let values: HashMap<String, String> = [
            ("POSTGRES_DB", "quay"),
            ("POSTGRES_USER", "quayuser"),
            ("POSTGRES_PASSWORD", "secret"),
            ("POSTGRES_VERSION", "15"),
            ("REDIS_PASSWORD", "redis&pass"),
            ("REDIS_VERSION", "7"),
            ("QUAY_VERSION", "v3.12.0"),
            ("NETWORK_NAME", "app-net"),
            ("QUAY_ROOT", "/srv/quay"),
            ("UNIT_DIR", "/tmp/units"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        StackConfig::from_values(Path::new("stack.env"), &values).unwrap()
    }

    #[test]
    fn test_instructions_fall_back_to_container_name() {
        let config = config();
        let mut addresses = AddressBook::default();
        addresses.record("quay-postgres", Ipv4Addr::new(10, 88, 0, 4), AddressSource::Allocated);

        let text = CheckpointCoordinator::new(&Silent)
            .render_instructions(&config, &addresses, None)
            .unwrap();

        assert!(text.contains("Host:      10.88.0.4\n"));
        assert!(text.contains("Host:      quay-redis (container name, resolvable only on network app-net)"));
        assert!(text.contains("redis&pass"));
        assert!(text.contains("/srv/quay/quay-config.tar.gz"));
        assert!(!text.contains("Config editor"));
    }

    #[test]
    fn test_missing_artifact_after_acknowledgement() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("bundle.tar.gz");

        let result = CheckpointCoordinator::new(&Silent).run_checkpoint("instructions", &artifact);
        assert!(matches!(result, Err(StackError::CheckpointArtifactMissing(p)) if p == artifact));
    }
}
