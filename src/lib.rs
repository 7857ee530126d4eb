//! Moniker resolution service core.
//!
//! A moniker is a hierarchical identifier for a dataset,
//! `[namespace@]domain[.subdomain]/segments[@version][/vN][?params]`.
//! This crate parses monikers, resolves them against a catalog of owned,
//! source-bound nodes, caches the results and reports usage telemetry.
//!
//! ```ignore
//! let registry = catalog::load_catalog(Path::new("catalog.yaml"))?;
//! let service = MonikerService::new(registry, &ServiceConfig::default())?;
//! service.start().await?;
//!
//! let caller = CallerIdentity::from_headers([("x-app-id", "risk-dashboard")]);
//! let result = service.resolve("prices.equity/AAPL@latest", &caller)?;
//! println!("{} via {}", result.query.unwrap_or_default(), result.source_type);
//!
//! service.shutdown().await;
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod moniker;
pub mod service;

pub use cache::{CacheConfig, CacheStats, ResolutionCache, TtlCache};
pub use catalog::{CatalogNode, CatalogRegistry, Ownership, ResolutionResult, SourceBinding, SourceType};
pub use config::ServiceConfig;
pub use error::{
    CatalogError, ConfigError, ParseError, ResolveError, ServiceError, TelemetryError,
    TemplateError,
};
pub use events::{TelemetryConfig, TelemetryPipeline, UsageEvent};
pub use identity::CallerIdentity;
pub use moniker::{Moniker, VersionType};
pub use service::{HealthReport, MonikerService};
