//! Configuration for org-directory

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::DirectoryError;

/// Default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("org-directory")
}

fn default_database_path() -> PathBuf {
    default_data_dir().join("directory.db")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Address the HTTP API binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Pre-shared key expected in the X-API-Key header
    #[serde(default)]
    pub api_key: Option<String>,

    /// How long a writer waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Pooled SQLite connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_pool_size() -> u32 {
    8
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            http_port: default_http_port(),
            api_key: None,
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_size: default_pool_size(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DirectoryError::Config(e.to_string()))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DirectoryError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DirectoryError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the settings the HTTP server cannot run without
    pub fn validate(&self) -> Result<(), DirectoryError> {
        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => {}
            _ => {
                return Err(DirectoryError::Config(
                    "api_key is not set (use --api-key, API_KEY or the config file)".into(),
                ))
            }
        }

        if self.http_port == 0 {
            return Err(DirectoryError::Config("http_port must be non-zero".into()));
        }

        if self.pool_size == 0 {
            return Err(DirectoryError::Config("pool_size must be non-zero".into()));
        }

        Ok(())
    }

    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.http_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.max_body_bytes, 65536);
        assert!(config.database_path.ends_with("directory.db"));
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str("http_port = 9100\napi_key = \"secret\"").unwrap();
        assert_eq!(config.http_port, 9100);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.bind_address, "0.0.0.0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_fails_validation() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(DirectoryError::Config(_))));

        let empty = Config {
            api_key: Some(String::new()),
            ..Config::default()
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config {
            http_port: 8123,
            api_key: Some("k".into()),
            ..Config::default()
        };
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.http_port, 8123);
        assert_eq!(loaded.api_key.as_deref(), Some("k"));
    }
}
