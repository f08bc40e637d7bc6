//! Configuration Management
//!
//! Handles persistent configuration for cloudschema: cache location,
//! per-provider TTL and request policy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "cloudschema";

/// Request and caching policy for one provider client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// How long a cached catalog stays valid
    pub ttl_hours: u64,
    /// Total attempts per request, including the first
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Backoff unit; the delay after attempt `n` is `base * 2^n`
    pub backoff_base_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            ttl_hours: 6,
            max_retries: 3,
            timeout_secs: 30,
            backoff_base_ms: 1000,
        }
    }
}

impl ClientSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Per-provider overrides; unset fields fall back to [`Config::defaults`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOverrides {
    #[serde(default)]
    pub ttl_hours: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub backoff_base_ms: Option<u64>,
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cache directory override
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    #[serde(default)]
    pub defaults: ClientSettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderOverrides>,
    /// Retention horizon for `cleanup`
    #[serde(default = "default_prune_days")]
    pub prune_max_age_days: u64,
}

fn default_prune_days() -> u64 {
    7
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: None,
            defaults: ClientSettings::default(),
            providers: BTreeMap::new(),
            prune_max_age_days: default_prune_days(),
        }
    }
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join(APP_DIR).join("config.json"))
    }

    /// Load configuration from the default location
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load configuration from a file; missing or invalid files yield defaults
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Effective cache directory (config > platform cache dir > ./.cloudschema-cache)
    pub fn effective_cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|p| p.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(".cloudschema-cache"))
    }

    /// Settings for a provider with its overrides applied
    pub fn settings_for(&self, provider: &str) -> ClientSettings {
        let mut settings = self.defaults.clone();
        if let Some(overrides) = self.providers.get(provider) {
            if let Some(ttl) = overrides.ttl_hours {
                settings.ttl_hours = ttl;
            }
            if let Some(retries) = overrides.max_retries {
                settings.max_retries = retries;
            }
            if let Some(timeout) = overrides.timeout_secs {
                settings.timeout_secs = timeout;
            }
            if let Some(backoff) = overrides.backoff_base_ms {
                settings.backoff_base_ms = backoff;
            }
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        let settings = config.settings_for("digitalocean");
        assert_eq!(settings.ttl_hours, 6);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.timeout(), Duration::from_secs(30));
        assert_eq!(config.prune_max_age_days, 7);
    }

    #[test]
    fn test_provider_overrides_merge() {
        let config: Config = serde_json::from_str(
            r#"{
                "defaults": {"ttl_hours": 12},
                "providers": {"hetzner": {"max_retries": 5}}
            }"#,
        )
        .unwrap();

        let hetzner = config.settings_for("hetzner");
        assert_eq!(hetzner.ttl_hours, 12);
        assert_eq!(hetzner.max_retries, 5);
        assert_eq!(hetzner.timeout_secs, 30);

        let digitalocean = config.settings_for("digitalocean");
        assert_eq!(digitalocean.max_retries, 3);
    }

    #[test]
    fn test_load_missing_and_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert_eq!(Config::load_from(&missing).prune_max_age_days, 7);

        let invalid = dir.path().join("config.json");
        std::fs::write(&invalid, "{not json").unwrap();
        assert!(Config::load_from(&invalid).cache_dir.is_none());
    }
}
