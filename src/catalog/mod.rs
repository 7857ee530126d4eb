//! Data catalog: hierarchical nodes, source bindings and moniker resolution.

pub mod dialect;
pub mod loader;
pub mod registry;
pub mod snapshot;
pub mod template;
pub mod types;

pub use dialect::Dialect;
pub use loader::{load_catalog, load_catalog_str};
pub use registry::{
    path_components, BindingSummary, CatalogRegistry, LineageEntry, NodeDescription,
    ResolutionResult,
};
pub use snapshot::CatalogHandle;
pub use template::{render, TemplateContext};
pub use types::{
    CatalogNode, ColumnSchema, DataQuality, DataSchema, Freshness, InheritedValue, Ownership,
    OwnershipField, ResolvedOwnership, Sla, SourceBinding, SourceType,
};
