//! Server configuration: TOML file, `TALLYD_*` environment, then CLI flags.

pub mod schema;

pub use schema::{Config, LogConfig, ServerConfig, StorageConfig};

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Default config location, e.g. `~/.config/tallyd/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tallyd")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Resolve the effective configuration.
///
/// An explicit path must exist. Without one, the default location is used if
/// present, otherwise built-in defaults. Environment overrides are applied on
/// top in both cases.
pub fn resolve(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match explicit {
        Some(path) => Config::load(path)?,
        None => match default_config_path().filter(|p| p.is_file()) {
            Some(path) => Config::load(&path)?,
            None => Config::default(),
        },
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn explicit_path_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nmax_connections = 3").unwrap();

        let config = resolve(Some(file.path())).unwrap();
        assert_eq!(config.server.max_connections, 3);
    }

    #[test]
    fn explicit_path_must_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(resolve(Some(file.path())).is_err());
    }
}
