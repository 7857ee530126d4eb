//! Service configuration.
//!
//! Loaded from YAML, then overridden by environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `MONIKER_CATALOG_PATH` | `catalog_path` |
//! | `MONIKER_CACHE_ENABLED` | `cache.enabled` |
//! | `MONIKER_CACHE_MAX_ENTRIES` | `cache.max_entries` |
//! | `MONIKER_CACHE_TTL_SECONDS` | `cache.ttl_seconds` |
//! | `MONIKER_TELEMETRY_ENABLED` | `telemetry.enabled` |
//! | `MONIKER_TELEMETRY_SINK` | `telemetry.sink_type` |
//! | `MONIKER_TELEMETRY_BATCH_SIZE` | `telemetry.batch_size` |
//! | `MONIKER_TELEMETRY_FLUSH_INTERVAL_SECONDS` | `telemetry.flush_interval_seconds` |
//! | `MONIKER_TELEMETRY_BUFFER_SIZE` | `telemetry.buffer_size` |
//! | `MONIKER_TELEMETRY_FILE_PATH` | `telemetry.file.path` |
//! | `MONIKER_TELEMETRY_BROADCAST_ENDPOINT` | `telemetry.broadcast.endpoint` |
//! | `MONIKER_TELEMETRY_BROADCAST_TOPIC` | `telemetry.broadcast.topic` |

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::cache::CacheConfig;
use crate::error::ConfigError;
use crate::events::{SinkType, TelemetryConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Catalog YAML file or directory
    pub catalog_path: Option<PathBuf>,
    pub cache: CacheConfig,
    pub telemetry: TelemetryConfig,
}

impl ServiceConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: Option<Self> =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(parsed.unwrap_or_default())
    }

    /// Read a YAML file, apply environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config {:?}", path))?
            .with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Apply `MONIKER_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply `MONIKER_*` overrides from `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("MONIKER_CATALOG_PATH") {
            self.catalog_path = Some(PathBuf::from(path));
        }

        let cache = &mut self.cache;
        set_parsed(&lookup, "MONIKER_CACHE_ENABLED", &mut cache.enabled)?;
        set_parsed(&lookup, "MONIKER_CACHE_MAX_ENTRIES", &mut cache.max_entries)?;
        set_parsed(&lookup, "MONIKER_CACHE_TTL_SECONDS", &mut cache.ttl_seconds)?;

        let telemetry = &mut self.telemetry;
        set_parsed(&lookup, "MONIKER_TELEMETRY_ENABLED", &mut telemetry.enabled)?;
        if let Some(sink) = lookup("MONIKER_TELEMETRY_SINK") {
            telemetry.sink_type = match sink.trim().to_ascii_lowercase().as_str() {
                "console" => SinkType::Console,
                "file" => SinkType::File,
                "broadcast" => SinkType::Broadcast,
                other => {
                    return Err(ConfigError::invalid(
                        "MONIKER_TELEMETRY_SINK",
                        format!("unknown sink '{}'", other),
                    ))
                }
            };
        }
        set_parsed(&lookup, "MONIKER_TELEMETRY_BATCH_SIZE", &mut telemetry.batch_size)?;
        set_parsed(
            &lookup,
            "MONIKER_TELEMETRY_FLUSH_INTERVAL_SECONDS",
            &mut telemetry.flush_interval_seconds,
        )?;
        set_parsed(&lookup, "MONIKER_TELEMETRY_BUFFER_SIZE", &mut telemetry.buffer_size)?;
        if let Some(path) = lookup("MONIKER_TELEMETRY_FILE_PATH") {
            telemetry.file.get_or_insert_with(Default::default).path = PathBuf::from(path);
        }
        if let Some(endpoint) = lookup("MONIKER_TELEMETRY_BROADCAST_ENDPOINT") {
            telemetry.broadcast.get_or_insert_with(Default::default).endpoint = endpoint;
        }
        if let Some(topic) = lookup("MONIKER_TELEMETRY_BROADCAST_TOPIC") {
            telemetry.broadcast.get_or_insert_with(Default::default).topic = topic;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.telemetry.validate()
    }
}

fn set_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, format!("'{}': {}", raw, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert!(config.catalog_path.is_none());
        assert!(config.cache.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = ServiceConfig::from_yaml_str(
            r#"
catalog_path: demos/catalog.yaml
cache:
  ttl_seconds: 30
telemetry:
  sink_type: broadcast
  broadcast:
    endpoint: 127.0.0.1:7777
"#,
        )
        .unwrap();
        assert_eq!(config.catalog_path, Some(PathBuf::from("demos/catalog.yaml")));
        assert_eq!(config.cache.ttl_seconds, 30);
        assert_eq!(config.cache.max_entries, 10_000);
        assert_eq!(config.telemetry.sink_type, SinkType::Broadcast);
        assert_eq!(
            config.telemetry.broadcast.as_ref().unwrap().topic,
            "moniker.usage"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(ServiceConfig::from_yaml_str("").unwrap(), ServiceConfig::default());
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            ServiceConfig::from_yaml_str("cache: [1, 2"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServiceConfig::default()
            .apply_env(env(&[
                ("MONIKER_CATALOG_PATH", "/etc/moniker/catalog"),
                ("MONIKER_CACHE_ENABLED", "false"),
                ("MONIKER_TELEMETRY_SINK", "File"),
                ("MONIKER_TELEMETRY_FILE_PATH", "/tmp/usage.jsonl"),
                ("MONIKER_TELEMETRY_FLUSH_INTERVAL_SECONDS", "0.25"),
            ]))
            .unwrap();
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/moniker/catalog"))
        );
        assert!(!config.cache.enabled);
        assert_eq!(config.telemetry.sink_type, SinkType::File);
        assert_eq!(
            config.telemetry.file.as_ref().unwrap().path,
            PathBuf::from("/tmp/usage.jsonl")
        );
        assert_eq!(config.telemetry.flush_interval_seconds, 0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_parse_error_names_variable() {
        let err = ServiceConfig::default()
            .apply_env(env(&[("MONIKER_CACHE_TTL_SECONDS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::Invalid { field, .. } => assert_eq!(field, "MONIKER_CACHE_TTL_SECONDS"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(ServiceConfig::default()
            .apply_env(env(&[("MONIKER_TELEMETRY_SINK", "kafka")]))
            .is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.yaml");
        std::fs::write(&path, "cache:\n  max_entries: 5\n").unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.cache.max_entries, 5);

        std::fs::write(&path, "telemetry:\n  batch_size: 0\n").unwrap();
        assert!(ServiceConfig::load(&path).is_err());
    }
}
