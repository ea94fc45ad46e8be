// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Stack Configuration - the validated parameter set driving every component
//
// Loaded once per invocation from an operator-authored env file:
// - Pre-parse quoting check of credential values
// - Required-key presence check
// - Typed validation (addresses, subnet, ports, timings)
// - Derived absolute paths under the persisted-data root

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Keys that must be present and non-empty.
pub const REQUIRED_KEYS: &[&str] = &[
    "POSTGRES_DB",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
    "POSTGRES_VERSION",
    "REDIS_PASSWORD",
    "REDIS_VERSION",
    "QUAY_VERSION",
    "NETWORK_NAME",
    "QUAY_ROOT",
];

/// Keys whose raw values are checked for unsafe quoting before parsing.
pub const CREDENTIAL_KEYS: &[&str] = &[
    "POSTGRES_PASSWORD",
    "REDIS_PASSWORD",
    "CONFIG_EDITOR_PASSWORD",
];

const SHELL_SPECIAL: &[char] = &[
    '!', '"', '#', '$', '&', '\'', '(', ')', '*', ';', '<', '>', '?', '[', '\\', ']', '^', '`',
    '{', '|', '}', '~',
];

const DEFAULT_STACK_NAME: &str = "quay";
const DEFAULT_POSTGRES_IMAGE: &str = "docker.io/library/postgres";
const DEFAULT_REDIS_IMAGE: &str = "docker.io/library/redis";
const DEFAULT_QUAY_IMAGE: &str = "quay.io/projectquay/quay";
const DEFAULT_ARCHIVE_NAME: &str = "quay-config.tar.gz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration key: {0}")]
    MissingConfig(String),
    #[error("Value of {0} contains shell-special characters and must be wrapped in single quotes")]
    UnsafeQuoting(String),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("Failed to read configuration {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("Malformed configuration {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
}

/// Credential value. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(********)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("********")
    }
}

/// IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    pub network: Ipv4Addr,
    pub prefix: u8,
}

impl Subnet {
    pub fn parse(value: &str) -> Option<Self> {
        let (addr, prefix) = value.split_once('/')?;
        let network: Ipv4Addr = addr.trim().parse().ok()?;
        let prefix: u8 = prefix.trim().parse().ok()?;
        if prefix > 32 {
            return None;
        }
        Some(Self { network, prefix })
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(addr) & mask == u32::from(self.network) & mask
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

#[derive(Debug, Clone)]
pub struct DatastoreSettings {
    pub database: String,
    pub user: String,
    pub password: Secret,
    pub version: String,
    pub image: String,
    pub address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub password: Secret,
    pub version: String,
    pub image: String,
    pub address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone)]
pub struct ApplicationSettings {
    pub version: String,
    pub image: String,
    pub address: Option<Ipv4Addr>,
    pub http_port: u16,
    pub https_port: u16,
    /// When set, install runs the config editor during the checkpoint
    pub config_editor_password: Option<Secret>,
}

#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub name: String,
    pub subnet: Option<Subnet>,
}

/// Absolute paths derived from the persisted-data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackPaths {
    pub root: PathBuf,
    pub datastore_data: PathBuf,
    pub config: PathBuf,
    pub storage: PathBuf,
    pub env: PathBuf,
}

impl StackPaths {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            datastore_data: root.join("postgres"),
            config: root.join("config"),
            storage: root.join("storage"),
            env: root.join("env"),
            root,
        }
    }

    /// Subdirectories the provisioner ensures, relative to the root.
    pub fn subpaths(&self) -> Vec<PathBuf> {
        [&self.datastore_data, &self.config, &self.storage, &self.env]
            .into_iter()
            .filter_map(|path| path.strip_prefix(&self.root).ok())
            .map(Path::to_path_buf)
            .collect()
    }

    /// Settings file produced by unpacking the checkpoint artifact.
    pub fn settings_file(&self) -> PathBuf {
        self.config.join("config.yaml")
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointSettings {
    pub archive: PathBuf,
    pub remove_archive: bool,
}

/// Probe budget and settle delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    pub probe_attempts: u32,
    pub probe_interval: Duration,
    pub settle: Duration,
    pub application_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            probe_attempts: 30,
            probe_interval: Duration::from_secs(2),
            settle: Duration::from_secs(5),
            application_settle: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    /// Env file this configuration was loaded from
    pub source: PathBuf,
    pub stack_name: String,
    pub datastore: DatastoreSettings,
    pub cache: CacheSettings,
    pub application: ApplicationSettings,
    pub network: NetworkSettings,
    pub paths: StackPaths,
    pub checkpoint: CheckpointSettings,
    pub timings: Timings,
    /// Quadlet directory the unit generator writes to
    pub unit_dir: PathBuf,
    /// Container runtime API socket; `None` uses the runtime client's defaults
    pub runtime_socket: Option<String>,
}

impl StackConfig {
    /// Load and validate the backing env file.
    ///
    /// The quoting check runs on the raw text before the file is parsed,
    /// since an unquoted special character corrupts parsing itself.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        check_credential_quoting(&raw)?;

        let iter = dotenvy::from_path_iter(path).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            values.insert(key, value);
        }

        Self::from_values(path, &values)
    }

    /// Build from already-parsed key/value pairs.
    pub fn from_values(
        source: &Path,
        values: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        for key in REQUIRED_KEYS {
            required(values, key)?;
        }

        let root = PathBuf::from(required(values, "QUAY_ROOT")?);
        if !root.is_absolute() {
            return Err(invalid("QUAY_ROOT", "must be an absolute path"));
        }
        let paths = StackPaths::under(&root);

        let subnet = match optional(values, "NETWORK_SUBNET") {
            Some(raw) => Some(
                Subnet::parse(raw)
                    .ok_or_else(|| invalid("NETWORK_SUBNET", "expected IPv4 CIDR such as 10.90.0.0/24"))?,
            ),
            None => None,
        };

        let postgres_ip = parse_address(values, "POSTGRES_IP", subnet)?;
        let redis_ip = parse_address(values, "REDIS_IP", subnet)?;
        let quay_ip = parse_address(values, "QUAY_IP", subnet)?;

        let fixed: Vec<(&str, Ipv4Addr)> = [
            ("POSTGRES_IP", postgres_ip),
            ("REDIS_IP", redis_ip),
            ("QUAY_IP", quay_ip),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.map(|ip| (k, ip)))
        .collect();
        for (i, (key, ip)) in fixed.iter().enumerate() {
            if let Some((other, _)) = fixed[..i].iter().find(|(_, prev)| prev == ip) {
                return Err(invalid(key, &format!("address {} already assigned to {}", ip, other)));
            }
        }

        let defaults = Timings::default();
        let timings = Timings {
            probe_attempts: parse_number(values, "READINESS_ATTEMPTS", defaults.probe_attempts)?,
            probe_interval: parse_secs(values, "READINESS_INTERVAL_SECS", defaults.probe_interval)?,
            settle: parse_secs(values, "SETTLE_SECS", defaults.settle)?,
            application_settle: parse_secs(values, "APP_SETTLE_SECS", defaults.application_settle)?,
        };
        if timings.probe_attempts == 0 {
            return Err(invalid("READINESS_ATTEMPTS", "must be at least 1"));
        }

        let archive = optional(values, "CHECKPOINT_ARCHIVE")
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join(DEFAULT_ARCHIVE_NAME));

        Ok(Self {
            source: source.to_path_buf(),
            stack_name: optional(values, "STACK_NAME")
                .unwrap_or(DEFAULT_STACK_NAME)
                .to_string(),
            datastore: DatastoreSettings {
                database: required(values, "POSTGRES_DB")?.to_string(),
                user: required(values, "POSTGRES_USER")?.to_string(),
                password: Secret::new(required(values, "POSTGRES_PASSWORD")?),
                version: required(values, "POSTGRES_VERSION")?.to_string(),
                image: optional(values, "POSTGRES_IMAGE")
                    .unwrap_or(DEFAULT_POSTGRES_IMAGE)
                    .to_string(),
                address: postgres_ip,
            },
            cache: CacheSettings {
                password: Secret::new(required(values, "REDIS_PASSWORD")?),
                version: required(values, "REDIS_VERSION")?.to_string(),
                image: optional(values, "REDIS_IMAGE")
                    .unwrap_or(DEFAULT_REDIS_IMAGE)
                    .to_string(),
                address: redis_ip,
            },
            application: ApplicationSettings {
                version: required(values, "QUAY_VERSION")?.to_string(),
                image: optional(values, "QUAY_IMAGE")
                    .unwrap_or(DEFAULT_QUAY_IMAGE)
                    .to_string(),
                address: quay_ip,
                http_port: parse_number(values, "QUAY_HTTP_PORT", 8080u16)?,
                https_port: parse_number(values, "QUAY_HTTPS_PORT", 8443u16)?,
                config_editor_password: optional(values, "CONFIG_EDITOR_PASSWORD").map(Secret::new),
            },
            network: NetworkSettings {
                name: required(values, "NETWORK_NAME")?.to_string(),
                subnet,
            },
            paths,
            checkpoint: CheckpointSettings {
                archive,
                remove_archive: parse_bool(values, "REMOVE_CHECKPOINT_ARCHIVE", false)?,
            },
            timings,
            unit_dir: resolve_unit_dir(values)?,
            runtime_socket: resolve_runtime_socket(values),
        })
    }

    pub fn datastore_name(&self) -> String {
        format!("{}-postgres", self.stack_name)
    }

    pub fn cache_name(&self) -> String {
        format!("{}-redis", self.stack_name)
    }

    pub fn application_name(&self) -> String {
        format!("{}-registry", self.stack_name)
    }

    pub fn config_editor_name(&self) -> String {
        format!("{}-config-editor", self.stack_name)
    }
}

/// Textual check of credential values, performed before key/value parsing.
///
/// A value is accepted when single-quoted, when double-quoted without
/// characters the shell still expands inside double quotes, or when
/// unquoted and free of shell-special characters.
pub fn check_credential_quoting(raw: &str) -> Result<(), ConfigError> {
    for line in raw.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = assignment.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if !CREDENTIAL_KEYS.contains(&key) {
            continue;
        }
        if !is_safely_quoted(value.trim_end()) {
            return Err(ConfigError::UnsafeQuoting(key.to_string()));
        }
    }
    Ok(())
}

fn is_safely_quoted(value: &str) -> bool {
    for quote in ['\'', '"'] {
        if let Some(rest) = value.strip_prefix(quote) {
            let Some(end) = rest.find(quote) else {
                return false;
            };
            if !is_inline_comment(&rest[end + 1..]) {
                return false;
            }
            let inner = &rest[..end];
            return quote == '\'' || !inner.contains(['$', '`', '\\', '!']);
        }
    }

    let bare = match value.find(" #").or_else(|| value.find("\t#")) {
        Some(index) => &value[..index],
        None => value,
    };
    !bare
        .chars()
        .any(|c| c.is_whitespace() || SHELL_SPECIAL.contains(&c))
}

/// Text after a closing quote: nothing, or whitespace and a `#` comment.
fn is_inline_comment(trailing: &str) -> bool {
    trailing.is_empty()
        || (trailing.starts_with(char::is_whitespace) && trailing.trim_start().starts_with('#'))
}

fn optional<'a>(values: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    values
        .get(key)
        .map(|v| v.as_str())
        .filter(|v| !v.trim().is_empty())
}

fn required<'a>(values: &'a HashMap<String, String>, key: &str) -> Result<&'a str, ConfigError> {
    optional(values, key).ok_or_else(|| ConfigError::MissingConfig(key.to_string()))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_address(
    values: &HashMap<String, String>,
    key: &str,
    subnet: Option<Subnet>,
) -> Result<Option<Ipv4Addr>, ConfigError> {
    let Some(raw) = optional(values, key) else {
        return Ok(None);
    };
    let addr: Ipv4Addr = raw
        .trim()
        .parse()
        .map_err(|_| invalid(key, "expected an IPv4 address"))?;
    if let Some(subnet) = subnet {
        if !subnet.contains(addr) {
            return Err(invalid(key, &format!("{} is outside NETWORK_SUBNET {}", addr, subnet)));
        }
    }
    Ok(Some(addr))
}

fn parse_number<T: std::str::FromStr>(
    values: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match optional(values, key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid(key, "expected a non-negative integer in range")),
        None => Ok(default),
    }
}

fn parse_secs(
    values: &HashMap<String, String>,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    parse_number(values, key, default.as_secs()).map(Duration::from_secs)
}

/// Quadlet directory for the invoking user unless overridden.
fn resolve_unit_dir(values: &HashMap<String, String>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = optional(values, "UNIT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|dir| dir.join("containers").join("systemd"))
        .ok_or_else(|| invalid("UNIT_DIR", "no user configuration directory; set UNIT_DIR explicitly"))
}

/// Prefer the rootless Podman API socket when it is listening.
fn resolve_runtime_socket(values: &HashMap<String, String>) -> Option<String> {
    if let Some(socket) = optional(values, "CONTAINER_SOCKET") {
        return Some(socket.to_string());
    }
    let podman = dirs::runtime_dir()?.join("podman").join("podman.sock");
    podman.exists().then(|| podman.display().to_string())
}

fn parse_bool(values: &HashMap<String, String>, key: &str, default: bool) -> Result<bool, ConfigError> {
    match optional(values, key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "true" | "yes" | "1") => Ok(true),
        Some(v) if matches!(v.as_str(), "false" | "no" | "0") => Ok(false),
        Some(_) => Err(invalid(key, "expected true or false")),
        None => Ok(default),
    }
}
