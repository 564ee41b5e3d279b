//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "VGEM_DATA_DIR";

/// File name of the SQLite database inside the data directory
pub const DATABASE_FILE: &str = "vgem.db";

/// Sync engine tuning parameters
///
/// Defaults match the shipped application; every field can be overridden
/// from the TOML config file via [`SyncConfig::apply`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote service (no trailing slash)
    pub endpoint_url: String,
    /// Delay before the first retry pass
    pub base_delay: Duration,
    /// Upper bound for the exponential backoff delay
    pub max_delay: Duration,
    /// Send attempts per item before it is dropped as permanently failed
    pub max_attempts: u32,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "http://127.0.0.1:8080".to_string(),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SyncConfig {
    /// Overlay values from a parsed config file onto the defaults
    pub fn apply(mut self, file: &TomlConfig) -> Self {
        if let Some(url) = &file.endpoint_url {
            self.endpoint_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = file.base_delay_ms {
            self.base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.max_delay_ms {
            self.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = file.max_attempts {
            self.max_attempts = n;
        }
        if let Some(ms) = file.request_timeout_ms {
            self.request_timeout = Duration::from_millis(ms);
        }
        self
    }
}

/// On-disk TOML configuration schema
///
/// All fields optional; absent fields keep their compiled defaults.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TomlConfig {
    pub data_dir: Option<String>,
    pub endpoint_url: Option<String>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub request_timeout_ms: Option<u64>,
}

/// Data directory resolution, priority order:
/// 1. Explicit argument from the embedding application (highest priority)
/// 2. Environment variable (`VGEM_DATA_DIR`)
/// 3. TOML config file (`data_dir` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(explicit: Option<&str>) -> PathBuf {
    // Priority 1: explicit argument
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_config_file() {
        if let Some(dir) = config.data_dir {
            return PathBuf::from(dir);
        }
    }

    // Priority 4: OS-dependent compiled default
    default_data_dir()
}

/// Full path of the SQLite database under a data directory
pub fn database_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DATABASE_FILE)
}

/// Load and parse the config file, if one exists
///
/// Looks for `<config dir>/vgem/config.toml` (e.g. `~/.config/vgem/config.toml`
/// on Linux). A missing file is an error the caller is expected to absorb;
/// a present but unparseable file is also an error so typos do not silently
/// fall back to defaults.
pub fn load_config_file() -> Result<TomlConfig> {
    let path = dirs::config_dir()
        .map(|d| d.join("vgem").join("config.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;

    if !path.exists() {
        return Err(Error::Config(format!("Config file not found: {}", path.display())));
    }

    let content = std::fs::read_to_string(&path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("vgem"))
        .unwrap_or_else(|| PathBuf::from("./vgem_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.base_delay < config.max_delay);
    }

    #[test]
    fn test_apply_overrides_only_present_fields() {
        let file = TomlConfig {
            endpoint_url: Some("https://sync.example.net/".to_string()),
            max_attempts: Some(8),
            ..Default::default()
        };

        let config = SyncConfig::default().apply(&file);
        // Trailing slash stripped so URL joining stays predictable
        assert_eq!(config.endpoint_url, "https://sync.example.net");
        assert_eq!(config.max_attempts, 8);
        assert_eq!(config.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_toml_parsing() {
        let parsed: TomlConfig = toml::from_str(
            r#"
            endpoint_url = "https://sync.example.net"
            base_delay_ms = 250
            max_delay_ms = 10000
            "#,
        )
        .unwrap();

        assert_eq!(parsed.base_delay_ms, Some(250));
        assert_eq!(parsed.max_delay_ms, Some(10000));
        assert!(parsed.data_dir.is_none());
    }

    #[test]
    fn test_database_path() {
        let path = database_path(Path::new("/tmp/vgem-data"));
        assert_eq!(path, PathBuf::from("/tmp/vgem-data/vgem.db"));
    }
}
