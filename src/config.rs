//! Configuration management for slimbox
//!
//! Settings are layered: built-in defaults, then an optional `slimbox.toml` at
//! the project root, then `SLIMBOX_*` environment variables. CLI flags are
//! applied last by the command handlers.
//!
//! # Environment Variables
//!
//! - `SLIMBOX_BUILDER_IMAGE`: base image of the resolver stage - default: "python:3.11-slim"
//! - `SLIMBOX_RUNTIME_IMAGE`: base image of the runtime stage - default: "python:3.11-slim"
//! - `SLIMBOX_POETRY_VERSION`: pinned resolver tool version - default: "1.8.3"
//! - `SLIMBOX_ENV_PATH`: location of the environment artifact - default: "/app/.venv"
//! - `SLIMBOX_WORKDIR`: working directory and source destination - default: "/app"
//! - `SLIMBOX_SOURCE_DIR`: application source tree, relative to the project - default: "src"
//! - `SLIMBOX_USER` / `SLIMBOX_GROUP`: execution identity names - default: "appuser" / "appgroup"
//! - `SLIMBOX_UID` / `SLIMBOX_GID`: execution identity ids - default: 999 / 999
//! - `SLIMBOX_PORT`: declared service port - default: 8000
//! - `SLIMBOX_APP_MODULE`: ASGI entrypoint object - default: "app.main:app"
//! - `SLIMBOX_ENVIRONMENT`: target environment (production|development) - default: "production"
//! - `SLIMBOX_RELOAD`: force reload-on-change on or off (true|false)
//! - `SLIMBOX_MAINTENANCE_COMMAND`: privileged maintenance step - default: "apt-get update"
//! - `SLIMBOX_HEALTHCHECK_PATH`: HTTP path requested by the image healthcheck
//! - `SLIMBOX_TAG`: image tag used by `slimbox build`
//!
//! # Example
//!
//! ```no_run
//! use slimbox::SlimboxConfig;
//! use std::path::Path;
//!
//! let config = SlimboxConfig::load(Path::new(".")).expect("Invalid configuration");
//! assert_eq!(config.port, 8000);
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

use crate::identity::ExecutionIdentity;
use crate::lock::Version;

pub const CONFIG_FILE: &str = "slimbox.toml";

const DEFAULT_PYTHON_IMAGE: &str = "python:3.11-slim";
const DEFAULT_POETRY_VERSION: &str = "1.8.3";
const DEFAULT_ENV_PATH: &str = "/app/.venv";
const DEFAULT_WORKDIR: &str = "/app";
const DEFAULT_SOURCE_DIR: &str = "src";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_APP_MODULE: &str = "app.main:app";
const DEFAULT_MAINTENANCE_COMMAND: &str = "apt-get update";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },

    /// The project configuration file could not be read
    #[error("Failed to read {}: {reason}", .path.display())]
    File { path: PathBuf, reason: String },
}

/// Where the service is headed; decides development-only behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetEnvironment {
    #[default]
    Production,
    Development,
}

impl FromStr for TargetEnvironment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(ConfigError::ParseError {
                field: "environment".to_string(),
                error: format!("unknown environment '{}' (expected production|development)", other),
            }),
        }
    }
}

impl fmt::Display for TargetEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production => write!(f, "production"),
            Self::Development => write!(f, "development"),
        }
    }
}

/// Main configuration structure for slimbox
#[derive(Debug, Clone, Serialize)]
pub struct SlimboxConfig {
    pub builder_image: String,
    pub runtime_image: String,
    pub poetry_version: String,
    pub env_path: String,
    pub workdir: String,
    pub source_dir: PathBuf,
    pub identity: ExecutionIdentity,
    pub port: u16,
    pub app_module: String,
    pub environment: TargetEnvironment,
    /// Explicit reload override; `None` derives it from `environment`
    pub reload: Option<bool>,
    pub maintenance_command: String,
    pub healthcheck_path: Option<String>,
    pub tag: Option<String>,
}

impl Default for SlimboxConfig {
    fn default() -> Self {
        Self {
            builder_image: DEFAULT_PYTHON_IMAGE.to_string(),
            runtime_image: DEFAULT_PYTHON_IMAGE.to_string(),
            poetry_version: DEFAULT_POETRY_VERSION.to_string(),
            env_path: DEFAULT_ENV_PATH.to_string(),
            workdir: DEFAULT_WORKDIR.to_string(),
            source_dir: PathBuf::from(DEFAULT_SOURCE_DIR),
            identity: ExecutionIdentity::default(),
            port: DEFAULT_PORT,
            app_module: DEFAULT_APP_MODULE.to_string(),
            environment: TargetEnvironment::default(),
            reload: None,
            maintenance_command: DEFAULT_MAINTENANCE_COMMAND.to_string(),
            healthcheck_path: None,
            tag: None,
        }
    }
}

/// Shape of `slimbox.toml`; every key is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    builder_image: Option<String>,
    runtime_image: Option<String>,
    poetry_version: Option<String>,
    env_path: Option<String>,
    workdir: Option<String>,
    source_dir: Option<PathBuf>,
    user: Option<String>,
    group: Option<String>,
    uid: Option<u32>,
    gid: Option<u32>,
    port: Option<u16>,
    app_module: Option<String>,
    environment: Option<TargetEnvironment>,
    reload: Option<bool>,
    maintenance_command: Option<String>,
    healthcheck_path: Option<String>,
    tag: Option<String>,
}

fn app_module_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*:[A-Za-z_][A-Za-z0-9_]*$")
            .expect("static regex")
    })
}

fn parse_env<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::ParseError {
                field: key.to_string(),
                error: e.to_string(),
            }),
    }
}

impl SlimboxConfig {
    /// Load configuration for a project: defaults, `slimbox.toml`, then the
    /// process environment
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_file(&project_root.join(CONFIG_FILE))?;
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        if !path.is_file() {
            return Ok(());
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|e| ConfigError::File {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Applying configuration from {}", path.display());

        if let Some(v) = file.builder_image {
            self.builder_image = v;
        }
        if let Some(v) = file.runtime_image {
            self.runtime_image = v;
        }
        if let Some(v) = file.poetry_version {
            self.poetry_version = v;
        }
        if let Some(v) = file.env_path {
            self.env_path = v;
        }
        if let Some(v) = file.workdir {
            self.workdir = v;
        }
        if let Some(v) = file.source_dir {
            self.source_dir = v;
        }
        if let Some(v) = file.port {
            self.port = v;
        }
        if let Some(v) = file.app_module {
            self.app_module = v;
        }
        if let Some(v) = file.environment {
            self.environment = v;
        }
        if let Some(v) = file.maintenance_command {
            self.maintenance_command = v;
        }
        if let Some(v) = file.user {
            self.identity.user = v;
        }
        if let Some(v) = file.group {
            self.identity.group = v;
        }
        if let Some(v) = file.uid {
            self.identity.uid = v;
        }
        if let Some(v) = file.gid {
            self.identity.gid = v;
        }
        if file.reload.is_some() {
            self.reload = file.reload;
        }
        if file.healthcheck_path.is_some() {
            self.healthcheck_path = file.healthcheck_path;
        }
        if file.tag.is_some() {
            self.tag = file.tag;
        }
        Ok(())
    }

    /// Overlay `SLIMBOX_*` variables read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let strings: [(&str, &mut String); 8] = [
            ("SLIMBOX_BUILDER_IMAGE", &mut self.builder_image),
            ("SLIMBOX_RUNTIME_IMAGE", &mut self.runtime_image),
            ("SLIMBOX_POETRY_VERSION", &mut self.poetry_version),
            ("SLIMBOX_ENV_PATH", &mut self.env_path),
            ("SLIMBOX_WORKDIR", &mut self.workdir),
            ("SLIMBOX_APP_MODULE", &mut self.app_module),
            ("SLIMBOX_MAINTENANCE_COMMAND", &mut self.maintenance_command),
            ("SLIMBOX_USER", &mut self.identity.user),
        ];
        for (key, slot) in strings {
            if let Some(v) = lookup(key) {
                *slot = v;
            }
        }
        if let Some(v) = lookup("SLIMBOX_GROUP") {
            self.identity.group = v;
        }
        if let Some(v) = lookup("SLIMBOX_SOURCE_DIR") {
            self.source_dir = PathBuf::from(v);
        }
        if let Some(v) = parse_env::<u32>(&lookup, "SLIMBOX_UID")? {
            self.identity.uid = v;
        }
        if let Some(v) = parse_env::<u32>(&lookup, "SLIMBOX_GID")? {
            self.identity.gid = v;
        }
        if let Some(v) = parse_env::<u16>(&lookup, "SLIMBOX_PORT")? {
            self.port = v;
        }
        if let Some(v) = parse_env::<TargetEnvironment>(&lookup, "SLIMBOX_ENVIRONMENT")? {
            self.environment = v;
        }
        if let Some(v) = parse_env::<bool>(&lookup, "SLIMBOX_RELOAD")? {
            self.reload = Some(v);
        }
        if let Some(v) = lookup("SLIMBOX_HEALTHCHECK_PATH") {
            self.healthcheck_path = Some(v);
        }
        if let Some(v) = lookup("SLIMBOX_TAG") {
            self.tag = Some(v);
        }
        Ok(())
    }

    /// Whether the entrypoint restarts the server on source changes
    pub fn reload_enabled(&self) -> bool {
        self.reload
            .unwrap_or(self.environment == TargetEnvironment::Development)
    }

    /// Validates the configuration
    ///
    /// Identity checks are left to the assembly stage so that they surface as
    /// identity failures rather than configuration ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: String| Err(ConfigError::ValidationFailed(msg));

        if self.builder_image.trim().is_empty() {
            return fail("Builder image cannot be empty".to_string());
        }
        if self.runtime_image.trim().is_empty() {
            return fail("Runtime image cannot be empty".to_string());
        }
        if self.port == 0 {
            return fail("Port must be between 1 and 65535".to_string());
        }
        if !app_module_regex().is_match(&self.app_module) {
            return fail(format!(
                "Invalid app module '{}', expected 'package.module:attribute'",
                self.app_module
            ));
        }
        if self.poetry_version.parse::<Version>().is_err()
            || self.poetry_version.contains(['<', '>', '=', '^', '~', '*'])
        {
            return fail(format!(
                "Poetry version '{}' must be an exact version",
                self.poetry_version
            ));
        }
        for (name, path) in [("env_path", &self.env_path), ("workdir", &self.workdir)] {
            if !path.starts_with('/') {
                return fail(format!("{} must be an absolute path, got '{}'", name, path));
            }
        }
        if self.env_path.trim_end_matches('/') == self.workdir.trim_end_matches('/') {
            return fail("env_path must not be the workdir itself".to_string());
        }
        if self.source_dir.is_absolute()
            || self
                .source_dir
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return fail(format!(
                "source_dir must be relative to the project, got '{}'",
                self.source_dir.display()
            ));
        }
        if let Some(ref path) = self.healthcheck_path {
            if !path.starts_with('/') {
                return fail(format!("healthcheck_path must start with '/', got '{}'", path));
            }
            // The path is embedded in a quoted Python literal
            if path
                .chars()
                .any(|c| matches!(c, '\'' | '"' | '\\') || c.is_whitespace() || c.is_control())
            {
                return fail(format!(
                    "healthcheck_path must not contain quotes, backslashes or whitespace, got '{}'",
                    path
                ));
            }
        }
        if self.maintenance_command.trim().is_empty() {
            return fail("Maintenance command cannot be empty".to_string());
        }
        Ok(())
    }

    /// Converts configuration to a display map for output formatting
    pub fn to_display_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert("builder_image".to_string(), self.builder_image.clone());
        map.insert("runtime_image".to_string(), self.runtime_image.clone());
        map.insert("poetry_version".to_string(), self.poetry_version.clone());
        map.insert("env_path".to_string(), self.env_path.clone());
        map.insert("workdir".to_string(), self.workdir.clone());
        map.insert(
            "source_dir".to_string(),
            self.source_dir.display().to_string(),
        );
        map.insert("identity".to_string(), self.identity.to_string());
        map.insert("port".to_string(), self.port.to_string());
        map.insert("app_module".to_string(), self.app_module.clone());
        map.insert("environment".to_string(), self.environment.to_string());
        map.insert("reload".to_string(), self.reload_enabled().to_string());
        map.insert(
            "maintenance_command".to_string(),
            self.maintenance_command.clone(),
        );
        if let Some(ref path) = self.healthcheck_path {
            map.insert("healthcheck_path".to_string(), path.clone());
        }
        map
    }
}

impl fmt::Display for SlimboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Slimbox Configuration:")?;
        for (key, value) in self.to_display_map() {
            writeln!(f, "  {}: {}", key, value)?;
        }
        Ok(())
    }
}
