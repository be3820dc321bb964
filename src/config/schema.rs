use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Port the service has always listened on.
pub const DEFAULT_PORT: u16 = 8888;

/// Longest accepted command line (64KB). Bounds per-connection buffering.
pub const DEFAULT_MAX_LINE_BYTES: usize = 65_536;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum concurrently served connections (0 = unlimited).
    pub max_connections: usize,
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            max_connections: 1024,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding both snapshot files. `~` is expanded.
    pub data_dir: String,
    pub credentials_file: String,
    pub counters_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: ".".into(),
            credentials_file: "auth_data".into(),
            counters_file: "data".into(),
        }
    }
}

impl StorageConfig {
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.data_dir).into_owned())
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.data_dir().join(&self.credentials_file)
    }

    pub fn counters_path(&self) -> PathBuf {
        self.data_dir().join(&self.counters_file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Config {
    /// Parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply `TALLYD_*` overrides from an environment lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("TALLYD_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("TALLYD_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("TALLYD_PORT is not a valid port: {port:?}"))?;
        }
        if let Some(dir) = lookup("TALLYD_DATA_DIR") {
            self.storage.data_dir = dir;
        }
        if let Some(level) = lookup("TALLYD_LOG") {
            self.log.level = level;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            bail!("server.host cannot be empty");
        }
        if self.server.max_line_bytes == 0 {
            bail!("server.max_line_bytes must be greater than zero");
        }
        if self.storage.credentials_file.trim().is_empty()
            || self.storage.counters_file.trim().is_empty()
        {
            bail!("storage.credentials_file and storage.counters_file cannot be empty");
        }
        if self.storage.credentials_path() == self.storage.counters_path() {
            bail!(
                "Credentials and counters cannot share one file: {}",
                self.storage.credentials_path().display()
            );
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}
