use std::fs;
use std::path::Path;

use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/babbel.json";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// How many messages the initial feed serves.
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    /// Lifetime of the cached window in seconds. Zero disables caching.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_database() -> String {
    "data/babbel.db".to_string()
}

fn default_window_size() -> usize {
    30
}

fn default_cache_ttl_secs() -> u64 {
    30
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            database: default_database(),
            window_size: default_window_size(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config("config/does-not-exist.json");
        assert_eq!(config.bind, "127.0.0.1:8000");
        assert_eq!(config.window_size, 30);
        assert_eq!(config.cache_ttl_secs, 30);
    }

    #[test]
    fn unparsable_file_yields_defaults() {
        let path = std::env::temp_dir().join("babbel-config-garbage.json");
        fs::write(&path, "{ not json").unwrap();
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.window_size, 30);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = std::env::temp_dir().join("babbel-config-partial.json");
        fs::write(&path, r#"{"cache_ttl_secs": 0}"#).unwrap();
        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.cache_ttl_secs, 0);
        assert_eq!(config.window_size, 30);
        assert_eq!(config.bind, "127.0.0.1:8000");
    }
}
