//! Moniker service: the contract exposed to transport layers.
//!
//! Wires the swappable catalog, the resolution cache and the telemetry
//! pipeline together. Every resolve emits exactly one usage event, whether
//! it succeeds or not; telemetry problems never surface to the caller.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheStats, ResolutionCache};
use crate::catalog::{
    load_catalog, CatalogHandle, CatalogRegistry, LineageEntry, NodeDescription, ResolutionResult,
};
use crate::config::ServiceConfig;
use crate::error::{ServiceError, TelemetryError};
use crate::events::{PipelineStats, TelemetryPipeline, UsageEvent};
use crate::identity::CallerIdentity;
use crate::moniker::{Moniker, MONIKER_SCHEME};

/// Snapshot for health endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub catalog_nodes: usize,
    pub catalog_generation: u64,
    pub cache: CacheStats,
    pub telemetry: PipelineStats,
}

pub struct MonikerService {
    catalog: CatalogHandle,
    cache: ResolutionCache,
    telemetry: TelemetryPipeline,
    catalog_path: Option<PathBuf>,
}

impl MonikerService {
    /// Build a service around an already loaded catalog.
    pub fn new(registry: CatalogRegistry, config: &ServiceConfig) -> Result<Self, TelemetryError> {
        config.cache.validate()?;
        Ok(Self {
            catalog: CatalogHandle::new(registry),
            cache: ResolutionCache::new(config.cache.clone()),
            telemetry: TelemetryPipeline::new(config.telemetry.clone())?,
            catalog_path: config.catalog_path.clone(),
        })
    }

    /// Build a service, loading the catalog from `config.catalog_path`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let path = config
            .catalog_path
            .as_ref()
            .context("catalog_path is not configured")?;
        let registry = load_catalog(path)?;
        Ok(Self::new(registry, config)?)
    }

    /// Start background telemetry delivery.
    pub async fn start(&self) -> Result<(), TelemetryError> {
        self.telemetry.start().await
    }

    /// Flush telemetry and stop.
    pub async fn shutdown(&self) {
        self.telemetry.shutdown().await;
    }

    /// Resolve an identifier to its source binding, rendered query and
    /// ownership.
    pub fn resolve(
        &self,
        identifier: &str,
        caller: &CallerIdentity,
    ) -> Result<ResolutionResult, ServiceError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();

        let result = self.cache.get_or_compute(identifier, || {
            let moniker = Moniker::parse(identifier)?;
            let catalog = self.catalog.load();
            Ok::<_, ServiceError>(catalog.resolve(&moniker)?)
        });
        let latency = started.elapsed();

        match &result {
            Ok(resolved) => {
                debug!(
                    %request_id,
                    moniker = %resolved.moniker,
                    binding = %resolved.binding_path,
                    source_type = %resolved.source_type,
                    latency_us = latency.as_micros() as u64,
                    "Resolved moniker"
                );
                self.telemetry.emit(UsageEvent::resolved(
                    request_id,
                    caller.clone(),
                    resolved,
                    latency,
                ));
            }
            Err(e) => {
                debug!(%request_id, identifier, error = %e, "Resolution failed");
                self.telemetry.emit(UsageEvent::resolve_failed(
                    request_id,
                    caller.clone(),
                    identifier.trim(),
                    e.is_not_found(),
                    &e.to_string(),
                    latency,
                ));
            }
        }
        result
    }

    /// Metadata and ownership for the deepest node matching `path`.
    pub fn describe(&self, path: &str) -> Result<NodeDescription, ServiceError> {
        Ok(self.catalog.load().describe(strip_scheme(path))?)
    }

    /// Direct children of `path`; empty or `/` lists top-level nodes.
    pub fn list(&self, path: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self.catalog.load().list(strip_scheme(path))?)
    }

    /// Ancestor chain root → node, each with its own ownership.
    pub fn lineage(&self, path: &str) -> Result<Vec<LineageEntry>, ServiceError> {
        Ok(self.catalog.load().lineage(strip_scheme(path))?)
    }

    /// Accept a client-reported access event.
    pub fn record_access(
        &self,
        payload: JsonValue,
        caller: &CallerIdentity,
    ) -> Result<(), TelemetryError> {
        let event = UsageEvent::from_access_payload(payload, caller)?;
        self.telemetry.emit(event);
        Ok(())
    }

    /// Publish a new catalog and invalidate cached resolutions.
    ///
    /// A resolve that loaded the old snapshot before the swap may still
    /// insert its result after the cache is cleared; such an entry lives at
    /// most one TTL.
    pub fn reload_catalog(&self, registry: CatalogRegistry) {
        let nodes = registry.len();
        self.catalog.swap(registry);
        self.cache.clear();
        info!(
            nodes,
            generation = self.catalog.generation(),
            "Catalog reloaded"
        );
    }

    /// Reload from the configured catalog path.
    pub fn reload_from_path(&self) -> Result<()> {
        let path = self
            .catalog_path
            .as_ref()
            .context("catalog_path is not configured")?;
        let registry = load_catalog(path)?;
        self.reload_catalog(registry);
        Ok(())
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            catalog_nodes: self.catalog.load().len(),
            catalog_generation: self.catalog.generation(),
            cache: self.cache.stats(),
            telemetry: self.telemetry.stats(),
        }
    }
}

fn strip_scheme(path: &str) -> &str {
    let path = path.trim();
    path.strip_prefix(MONIKER_SCHEME).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{load_catalog_str, SourceType};
    use crate::events::TelemetryConfig;

    const CATALOG: &str = r#"
prices:
  ownership:
    accountable_owner: jane@firm.com
prices.equity:
  source_binding:
    type: snowflake
    query: "SELECT * FROM equity WHERE symbol = '{segments[0]}'"
"#;

    fn service() -> MonikerService {
        let config = ServiceConfig::default().with_telemetry(TelemetryConfig::default());
        MonikerService::new(load_catalog_str(CATALOG).unwrap(), &config).unwrap()
    }

    #[test]
    fn test_resolve_emits_event_and_caches() {
        let svc = service();
        let caller = CallerIdentity::new("app", "team");
        let first = svc.resolve("prices.equity/AAPL", &caller).unwrap();
        let second = svc.resolve("prices.equity/AAPL", &caller).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.source_type, SourceType::Snowflake);

        let health = svc.health();
        assert_eq!(health.cache.hits, 1);
        assert_eq!(health.telemetry.emitted, 2);
        assert_eq!(health.telemetry.pending, 2);
    }

    #[test]
    fn test_errors_map_to_status_and_emit() {
        let svc = service();
        let anon = CallerIdentity::anonymous();
        assert_eq!(svc.resolve("", &anon).unwrap_err().http_status(), 400);
        assert_eq!(svc.resolve("bonds/x", &anon).unwrap_err().http_status(), 404);
        assert_eq!(svc.resolve("prices/fx", &anon).unwrap_err().http_status(), 422);
        assert_eq!(svc.health().telemetry.emitted, 3);
        assert_eq!(svc.health().cache.entries, 0);
    }

    #[test]
    fn test_reload_swaps_catalog_and_clears_cache() {
        let svc = service();
        let anon = CallerIdentity::anonymous();
        svc.resolve("prices.equity/AAPL", &anon).unwrap();
        assert_eq!(svc.health().cache.entries, 1);

        svc.reload_catalog(load_catalog_str("bonds:\n  source_binding:\n    type: oracle\n").unwrap());
        assert_eq!(svc.health().cache.entries, 0);
        assert_eq!(svc.health().catalog_generation, 1);
        assert!(svc.resolve("prices.equity/AAPL", &anon).unwrap_err().is_not_found());
        assert_eq!(
            svc.resolve("bonds/UST", &anon).unwrap().source_type,
            SourceType::Oracle
        );
    }

    #[test]
    fn test_describe_accepts_scheme() {
        let svc = service();
        let d = svc.describe("moniker://prices.equity").unwrap();
        assert_eq!(d.path, "prices.equity");
        assert_eq!(svc.list("/").unwrap(), vec!["prices"]);
        assert_eq!(svc.lineage("prices.equity").unwrap().len(), 2);
    }

    #[test]
    fn test_record_access_validates() {
        let svc = service();
        let anon = CallerIdentity::anonymous();
        assert!(svc
            .record_access(serde_json::json!({"moniker": "a/b"}), &anon)
            .is_err());
        svc.record_access(
            serde_json::json!({
                "timestamp": "2026-01-15T10:00:00Z",
                "moniker": "prices.equity/AAPL",
                "operation": "access",
                "outcome": "success"
            }),
            &anon,
        )
        .unwrap();
        assert_eq!(svc.health().telemetry.emitted, 1);
    }

    #[test]
    fn test_from_config_requires_catalog_path() {
        assert!(MonikerService::from_config(&ServiceConfig::default()).is_err());
    }
}
