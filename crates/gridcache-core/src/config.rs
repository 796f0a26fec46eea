//! Application configuration management.
//!
//! This module handles loading and saving the core configuration,
//! which includes the upstream base URL, the season to default to,
//! and an optional cache directory override.
//!
//! Configuration is stored at `~/.config/gridcache/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "gridcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default upstream base URL.
const DEFAULT_BASE_URL: &str = "https://api.nflstats.dev/v1";

/// Season assumed when the caller does not specify one.
const DEFAULT_SEASON: u16 = 2025;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub api_base_url: String,
    pub default_season: u16,
    /// Override for the cache location; `None` uses the platform cache dir.
    pub cache_dir_override: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_BASE_URL.to_string(),
            default_season: DEFAULT_SEASON,
            cache_dir_override: None,
        }
    }
}

impl CoreConfig {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir_override {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.api_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.default_season, DEFAULT_SEASON);
        assert!(config.cache_dir_override.is_none());
    }

    #[test]
    fn test_cache_dir_override_wins() {
        let config = CoreConfig {
            cache_dir_override: Some(PathBuf::from("/tmp/gridcache-test")),
            ..CoreConfig::default()
        };
        assert_eq!(
            config.cache_dir().unwrap(),
            PathBuf::from("/tmp/gridcache-test")
        );
    }
}
