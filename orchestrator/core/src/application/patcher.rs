// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Config Patcher
//!
//! Unpacks the checkpoint bundle and removes settings the runtime
//! environment cannot honour. Rules are plain substrings matched anywhere
//! on a line; every matching line is deleted whole, so a rule that happens
//! to match a value deletes that line too.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};

use crate::domain::errors::PatchError;

/// Database connection arguments the registry's driver rejects in this environment.
pub const DEFAULT_STRIP_RULES: &[&str] = &[
    "keepalives:",
    "keepalives_idle",
    "keepalives_interval",
    "keepalives_count",
    "keepalivesidle",
    "keepalivesinterval",
    "keepalivescount",
    "tcp_user_timeout",
];

/// Settings file path inside the bundle.
pub const SETTINGS_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRules(Vec<String>);

impl PatchRules {
    pub fn new<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(rules.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, line: &str) -> bool {
        self.0.iter().any(|rule| line.contains(rule.as_str()))
    }

    pub fn rules(&self) -> &[String] {
        &self.0
    }
}

impl Default for PatchRules {
    fn default() -> Self {
        Self::new(DEFAULT_STRIP_RULES.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub settings_file: PathBuf,
    pub removed: Vec<String>,
    pub kept: usize,
}

pub struct ConfigPatcher {
    config_dir: PathBuf,
}

impl ConfigPatcher {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Unpack `artifact` into the config directory and strip matching lines
    /// from the settings file it contains.
    pub fn patch(&self, artifact: &Path, rules: &PatchRules) -> Result<PatchReport, PatchError> {
        self.unpack(artifact)?;

        let settings = self.config_dir.join(SETTINGS_FILE);
        if !settings.is_file() {
            return Err(PatchError::MissingSettingsFile(settings));
        }

        strip_lines(&settings, rules)
    }

    pub fn unpack(&self, artifact: &Path) -> Result<(), PatchError> {
        let unpack_failure = |reason: String| PatchError::UnpackFailure {
            archive: artifact.to_path_buf(),
            reason,
        };

        let file = File::open(artifact).map_err(|e| unpack_failure(e.to_string()))?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive
            .unpack(&self.config_dir)
            .map_err(|e| unpack_failure(e.to_string()))?;

        info!(
            archive = %artifact.display(),
            destination = %self.config_dir.display(),
            "Unpacked configuration bundle"
        );
        Ok(())
    }
}

/// Delete every line matching any rule, in a single rewrite.
///
/// The result is written to a sibling temporary file and renamed over the
/// original, so readers see either the old file or the fully patched one.
/// Kept lines, including their terminators, are byte-identical.
pub fn strip_lines(path: &Path, rules: &PatchRules) -> Result<PatchReport, PatchError> {
    let io_error = |source: std::io::Error| PatchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let original = std::fs::read_to_string(path).map_err(io_error)?;

    let mut patched = String::with_capacity(original.len());
    let mut removed = Vec::new();
    let mut kept = 0usize;
    for line in original.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if rules.matches(content) {
            debug!(line = content, "Removing line");
            removed.push(content.to_string());
        } else {
            patched.push_str(line);
            kept += 1;
        }
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
    tmp.write_all(patched.as_bytes()).map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;
    let permissions = std::fs::metadata(path).map_err(io_error)?.permissions();
    std::fs::set_permissions(tmp.path(), permissions).map_err(io_error)?;
    tmp.persist(path).map_err(|e| io_error(e.error))?;

    info!(
        file = %path.display(),
        removed = removed.len(),
        kept,
        "Patched settings file"
    );

    Ok(PatchReport {
        settings_file: path.to_path_buf(),
        removed,
        kept,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_match_substrings_anywhere() {
        let rules = PatchRules::new(["keepalivescount"]);
        assert!(rules.matches("    keepalivescount: 5"));
        assert!(rules.matches("note: keepalivescount appears in a value"));
        assert!(!rules.matches("keepalives_count: 5"));
    }

    #[test]
    fn test_strip_preserves_unmatched_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let input = "DB_CONNECTION_ARGS:\r\n  keepalives: 1\n  sslmode: disable  \n  keepalives_idle: 30\nSERVER_HOSTNAME: registry.local";
        std::fs::write(&path, input).unwrap();

        let report = strip_lines(&path, &PatchRules::default()).unwrap();

        assert_eq!(report.removed.len(), 2);
        assert_eq!(report.kept, 3);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "DB_CONNECTION_ARGS:\r\n  sslmode: disable  \nSERVER_HOSTNAME: registry.local"
        );
    }

    #[test]
    fn test_strip_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = strip_lines(&dir.path().join("absent.yaml"), &PatchRules::default());
        assert!(matches!(result, Err(PatchError::Io { .. })));
    }
}
