// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Definition Generator
//!
//! Renders one Podman Quadlet `.container` file per service so the init
//! system supervises the stack across reboots. The systemd generator turns
//! `<name>.container` into `<name>.service` on reload; dependency relations
//! between those derived units come straight from the [`StackGraph`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::domain::errors::StackError;
use crate::domain::graph::StackGraph;
use crate::domain::init_system::{InitSystem, UnitEnable};
use crate::domain::service::ServiceDescriptor;

/// Generous start timeout; the first start may pull a large image.
pub const START_TIMEOUT_SECS: u32 = 900;

/// An INI-style unit file with ordered sections and repeatable keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl UnitFile {
    pub fn section(&mut self, name: &str) -> &mut Self {
        if !self.sections.iter().any(|(n, _)| n == name) {
            self.sections.push((name.to_string(), Vec::new()));
        }
        self
    }

    /// Append `key=value` to `section`, creating the section on first use.
    pub fn entry(&mut self, section: &str, key: &str, value: impl Into<String>) -> &mut Self {
        self.section(section);
        if let Some((_, entries)) = self.sections.iter_mut().find(|(n, _)| n == section) {
            entries.push((key.to_string(), value.into()));
        }
        self
    }

    /// All values for `key` in `section`, in insertion order.
    pub fn values(&self, section: &str, key: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|(n, _)| n == section)
            .flat_map(|(_, entries)| entries.iter())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, (name, entries)) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = writeln!(out, "[{}]", name);
            for (key, value) in entries {
                let _ = writeln!(out, "{}={}", key, value);
            }
        }
        out
    }
}

/// Quote one `Exec=` argument for systemd's command-line parser.
///
/// `$` and `%` are always doubled so systemd does not expand them as
/// variables or specifiers.
pub fn systemd_quote(arg: &str) -> String {
    let needs_quotes = arg.is_empty()
        || arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | ';'));

    let mut escaped = String::with_capacity(arg.len() + 2);
    for c in arg.chars() {
        match c {
            '$' => escaped.push_str("$$"),
            '%' => escaped.push_str("%%"),
            '\\' if needs_quotes => escaped.push_str("\\\\"),
            '"' if needs_quotes => escaped.push_str("\\\""),
            _ => escaped.push(c),
        }
    }

    if needs_quotes {
        format!("\"{}\"", escaped)
    } else {
        escaped
    }
}

pub struct UnitGenerator<'a> {
    init: &'a dyn InitSystem,
    unit_dir: PathBuf,
    env_dir: PathBuf,
}

impl<'a> UnitGenerator<'a> {
    pub fn new(init: &'a dyn InitSystem, unit_dir: impl Into<PathBuf>, env_dir: impl Into<PathBuf>) -> Self {
        Self {
            init,
            unit_dir: unit_dir.into(),
            env_dir: env_dir.into(),
        }
    }

    pub fn unit_path(&self, service: &ServiceDescriptor) -> PathBuf {
        self.unit_dir.join(service.unit_file_name())
    }

    pub fn env_path(&self, service: &ServiceDescriptor) -> PathBuf {
        self.env_dir.join(service.env_file_name())
    }

    /// Render the Quadlet definition for `service`.
    pub fn render(&self, service: &ServiceDescriptor, graph: &StackGraph) -> UnitFile {
        let mut unit = UnitFile::default();

        unit.entry("Unit", "Description", service.description.clone())
            .entry("Unit", "Wants", "network-online.target")
            .entry("Unit", "After", "network-online.target");

        let dependencies: Vec<String> = graph
            .dependencies_of(&service.name)
            .iter()
            .map(|dep| dep.unit_name())
            .collect();
        if !dependencies.is_empty() {
            let joined = dependencies.join(" ");
            unit.entry("Unit", "After", joined.clone())
                .entry("Unit", "BindsTo", joined);
        }

        unit.entry("Container", "ContainerName", service.name.clone())
            .entry("Container", "Image", service.image.clone())
            .entry("Container", "Network", service.network.clone());
        if let Some(address) = service.address {
            unit.entry("Container", "IP", address.to_string());
        }
        for port in &service.ports {
            unit.entry("Container", "PublishPort", port.to_string());
        }
        if !service.environment.is_empty() {
            unit.entry(
                "Container",
                "EnvironmentFile",
                self.env_path(service).display().to_string(),
            );
        }
        for mount in &service.mounts {
            unit.entry("Container", "Volume", mount.to_bind());
        }
        if !service.command.is_empty() {
            let exec: Vec<String> = service.command.iter().map(|a| systemd_quote(a)).collect();
            unit.entry("Container", "Exec", exec.join(" "));
        }

        unit.entry("Service", "Restart", service.restart.as_unit_value())
            .entry("Service", "TimeoutStartSec", START_TIMEOUT_SECS.to_string());

        if service.auto_start {
            unit.entry("Install", "WantedBy", "default.target");
        }

        unit
    }

    /// Write unit and environment files for every service in the graph.
    ///
    /// Returns the written paths. Existing files are overwritten.
    pub fn generate(&self, graph: &StackGraph) -> Result<Vec<PathBuf>, StackError> {
        std::fs::create_dir_all(&self.unit_dir).map_err(|e| {
            StackError::GeneratorFailure(format!(
                "Cannot create unit directory {}: {}",
                self.unit_dir.display(),
                e
            ))
        })?;

        let mut written = Vec::new();
        for service in graph.startup_order() {
            if !service.environment.is_empty() {
                let env_path = self.env_path(service);
                write_env_file(&env_path, service)?;
                written.push(env_path);
            }

            let unit_path = self.unit_path(service);
            std::fs::write(&unit_path, self.render(service, graph).render()).map_err(|e| {
                StackError::GeneratorFailure(format!(
                    "Cannot write {}: {}",
                    unit_path.display(),
                    e
                ))
            })?;
            info!(service = %service.name, path = %unit_path.display(), "Wrote unit definition");
            written.push(unit_path);
        }

        Ok(written)
    }

    /// Reload the init system and start the application's derived unit.
    pub async fn activate(&self, application: &ServiceDescriptor) -> Result<(), StackError> {
        let unit = application.unit_name();

        self.init.reload().await?;

        if !self.init.unit_loaded(&unit).await? {
            return Err(StackError::GeneratorFailure(format!(
                "{} was not produced from {}; check the Quadlet definition",
                unit,
                self.unit_path(application).display()
            )));
        }

        match self.init.enable(&unit).await? {
            UnitEnable::Enabled => info!(unit = %unit, "Enabled unit"),
            UnitEnable::Generated => warn!(
                unit = %unit,
                "Generated unit cannot be enabled; boot start comes from its [Install] section"
            ),
        }

        self.init.start(&unit).await?;
        info!(unit = %unit, "Started unit");
        Ok(())
    }
}

fn write_env_file(path: &Path, service: &ServiceDescriptor) -> Result<(), StackError> {
    let mut content = String::new();
    for (key, value) in &service.environment {
        if value.contains('\n') {
            return Err(StackError::GeneratorFailure(format!(
                "Environment value for {} in {} spans multiple lines",
                key, service.name
            )));
        }
        let _ = writeln!(content, "{}={}", key, value);
    }

    let failure = |e: std::io::Error| {
        StackError::GeneratorFailure(format!("Cannot write {}: {}", path.display(), e))
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(failure)?;
    }
    std::fs::write(path, content).map_err(failure)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(failure)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_file_render_keeps_order_and_repeats() {
        let mut unit = UnitFile::default();
        unit.entry("Unit", "After", "a.service")
            .entry("Container", "PublishPort", "80:8080")
            .entry("Unit", "After", "b.service")
            .entry("Container", "PublishPort", "443:8443");

        assert_eq!(
            unit.render(),
            "[Unit]\nAfter=a.service\nAfter=b.service\n\n[Container]\nPublishPort=80:8080\nPublishPort=443:8443\n"
        );
        assert_eq!(unit.values("Unit", "After"), vec!["a.service", "b.service"]);
    }

    #[test]
    fn test_systemd_quote() {
        assert_eq!(systemd_quote("redis-server"), "redis-server");
        assert_eq!(systemd_quote("pa$$word"), "pa$$$$word");
        assert_eq!(systemd_quote("50%"), "50%%");
        assert_eq!(systemd_quote("two words"), "\"two words\"");
        assert_eq!(systemd_quote("a\"b"), "\"a\\\"b\"");
        assert_eq!(systemd_quote(""), "\"\"");
    }
}
