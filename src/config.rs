// ABOUTME: TOML configuration for the database connection, sync policy and log output
// ABOUTME: Looks for --config, then ./dept-sync.toml, then the user config directory

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::sync::{SyncOptions, UpdatePolicy};
use crate::table::redact_url;

pub const CONFIG_FILE_NAME: &str = "dept-sync.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// `postgresql://...`, `postgres://...` or `sqlite:<path>`
    #[serde(default)]
    pub url: String,
    /// Overrides the user embedded in `url`
    pub user: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub statement_timeout_secs: Option<u64>,
    /// Accept self-signed or otherwise invalid TLS certificates (PostgreSQL only)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &redact_url(&self.url))
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub update_policy: UpdatePolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// Write logs to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Config {
    /// Parse and validate a configuration document.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config = Self::parse(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        toml::from_str(contents).context("Failed to parse configuration")
    }

    /// Read and parse the configuration file at `path`.
    ///
    /// Validation is left to the caller so command-line overrides can fill gaps first.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config = Self::parse(&contents)
            .with_context(|| format!("Invalid configuration file {}", path.display()))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            bail!("database.url is not set");
        }
        Ok(())
    }

    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            update_policy: self.sync.update_policy,
            ..SyncOptions::default()
        }
    }
}

/// Resolve which configuration file to load.
///
/// An explicit path must exist. Otherwise the first existing default location wins.
pub fn locate(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("Configuration file not found: {}", path.display());
        }
        return Ok(path.to_path_buf());
    }

    let candidates = default_locations();
    if let Some(found) = candidates.iter().find(|p| p.exists()) {
        return Ok(found.clone());
    }

    let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    bail!(
        "No configuration file found (looked in: {}).\n\
         Create {} or pass --config <path>.",
        searched.join(", "),
        CONFIG_FILE_NAME
    )
}

/// `./dept-sync.toml`, then `<config dir>/dept-sync/config.toml`.
pub fn default_locations() -> Vec<PathBuf> {
    let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        locations.push(dir.join("dept-sync").join("config.toml"));
    }
    locations
}
