// ⚙️ Configuration - TOML file with sensible defaults
//
// Every field is optional in the file; missing ones fall back to Default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::debounce::DEFAULT_DEBOUNCE;
use crate::entities::DEFAULT_COUNTRY;

/// Environment variable pointing at the config file
pub const CONFIG_ENV: &str = "BRANCHES_CONFIG";

/// Config file looked up in the working directory when the env var is unset
pub const DEFAULT_CONFIG_FILE: &str = "branches.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// SQLite database holding the branches table
    pub database_path: PathBuf,

    /// JSON file holding the persisted selection
    pub selection_path: PathBuf,

    /// Quiet period before a branch-change notification is emitted
    pub debounce_ms: u64,

    /// Country written on create when none is given
    pub default_country: String,

    /// tracing filter directive (RUST_LOG overrides it)
    pub log_filter: String,

    /// Listen address for the HTTP server
    pub server_addr: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            database_path: PathBuf::from("branches.db"),
            selection_path: PathBuf::from("selection.json"),
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            default_country: DEFAULT_COUNTRY.to_string(),
            log_filter: "info".to_string(),
            server_addr: "0.0.0.0:3000".to_string(),
        }
    }
}

impl RegistryConfig {
    /// Parse a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// `$BRANCHES_CONFIG`, else `./branches.toml`, else defaults
    pub fn discover() -> Result<Self> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Self::load(local);
        }

        Ok(Self::default())
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.debounce_window(), DEFAULT_DEBOUNCE);
        assert_eq!(config.default_country, DEFAULT_COUNTRY);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RegistryConfig::from_toml(
            r#"
            database_path = "/var/lib/gym/branches.db"
            debounce_ms = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/gym/branches.db"));
        assert_eq!(config.debounce_window(), Duration::from_millis(25));
        assert_eq!(config.selection_path, PathBuf::from("selection.json"));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_load_reports_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("branches.toml");
        std::fs::write(&path, "debounce_ms = \"soon\"").unwrap();

        let err = RegistryConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config"));

        assert!(RegistryConfig::load(&dir.path().join("missing.toml")).is_err());
    }
}
