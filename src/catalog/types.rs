//! Catalog types: ownership, source bindings and catalog nodes.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::dialect::Dialect;

/// Supported data source types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Snowflake,
    Oracle,
    Rest,
    Static,
    Excel,
    Bloomberg,
    Refinitiv,
    /// OpenSearch/Elasticsearch
    Opensearch,
    /// Combines multiple sources
    Composite,
    /// Computed from other monikers
    Derived,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Snowflake => "snowflake",
            SourceType::Oracle => "oracle",
            SourceType::Rest => "rest",
            SourceType::Static => "static",
            SourceType::Excel => "excel",
            SourceType::Bloomberg => "bloomberg",
            SourceType::Refinitiv => "refinitiv",
            SourceType::Opensearch => "opensearch",
            SourceType::Composite => "composite",
            SourceType::Derived => "derived",
        }
    }

    /// Query dialect used for date-aware placeholders, if any.
    pub fn dialect(&self) -> Option<Dialect> {
        match self {
            SourceType::Snowflake => Some(Dialect::Snowflake),
            SourceType::Oracle => Some(Dialect::Oracle),
            SourceType::Rest => Some(Dialect::Rest),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ownership declared on a catalog node.
///
/// Every field inherits independently from ancestors when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ownership {
    /// Executive accountable for the data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accountable_owner: Option<String>,
    /// Technical SME / data expert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_specialist: Option<String>,
    /// Slack/Teams channel for help
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_channel: Option<String>,

    /// Accountable Data Owner/Principal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adop: Option<String>,
    /// Accountable Data Steward
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ads: Option<String>,
    /// Accountable Data Access Lead
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adal: Option<String>,
}

impl Ownership {
    /// Value of `field`. Blank values count as unset, so they never block
    /// inheritance from an ancestor.
    pub fn get(&self, field: OwnershipField) -> Option<&str> {
        let value = match field {
            OwnershipField::AccountableOwner => self.accountable_owner.as_deref(),
            OwnershipField::DataSpecialist => self.data_specialist.as_deref(),
            OwnershipField::SupportChannel => self.support_channel.as_deref(),
            OwnershipField::Adop => self.adop.as_deref(),
            OwnershipField::Ads => self.ads.as_deref(),
            OwnershipField::Adal => self.adal.as_deref(),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    pub fn is_empty(&self) -> bool {
        OwnershipField::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

/// One independently inherited ownership field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OwnershipField {
    AccountableOwner,
    DataSpecialist,
    SupportChannel,
    Adop,
    Ads,
    Adal,
}

impl OwnershipField {
    pub const ALL: [OwnershipField; 6] = [
        OwnershipField::AccountableOwner,
        OwnershipField::DataSpecialist,
        OwnershipField::SupportChannel,
        OwnershipField::Adop,
        OwnershipField::Ads,
        OwnershipField::Adal,
    ];
}

/// An inherited value and the catalog path that defined it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InheritedValue {
    pub value: String,
    pub defined_at: String,
}

/// Effective ownership after walking the hierarchy, with provenance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOwnership {
    pub accountable_owner: Option<InheritedValue>,
    pub data_specialist: Option<InheritedValue>,
    pub support_channel: Option<InheritedValue>,
    pub adop: Option<InheritedValue>,
    pub ads: Option<InheritedValue>,
    pub adal: Option<InheritedValue>,
}

impl ResolvedOwnership {
    pub fn get(&self, field: OwnershipField) -> Option<&InheritedValue> {
        self.slot(field).as_ref()
    }

    pub(crate) fn slot_mut(&mut self, field: OwnershipField) -> &mut Option<InheritedValue> {
        match field {
            OwnershipField::AccountableOwner => &mut self.accountable_owner,
            OwnershipField::DataSpecialist => &mut self.data_specialist,
            OwnershipField::SupportChannel => &mut self.support_channel,
            OwnershipField::Adop => &mut self.adop,
            OwnershipField::Ads => &mut self.ads,
            OwnershipField::Adal => &mut self.adal,
        }
    }

    fn slot(&self, field: OwnershipField) -> &Option<InheritedValue> {
        match field {
            OwnershipField::AccountableOwner => &self.accountable_owner,
            OwnershipField::DataSpecialist => &self.data_specialist,
            OwnershipField::SupportChannel => &self.support_channel,
            OwnershipField::Adop => &self.adop,
            OwnershipField::Ads => &self.ads,
            OwnershipField::Adal => &self.adal,
        }
    }

    /// Plain values without provenance.
    pub fn ownership(&self) -> Ownership {
        let value = |field| self.get(field).map(|v| v.value.clone());
        Ownership {
            accountable_owner: value(OwnershipField::AccountableOwner),
            data_specialist: value(OwnershipField::DataSpecialist),
            support_channel: value(OwnershipField::SupportChannel),
            adop: value(OwnershipField::Adop),
            ads: value(OwnershipField::Ads),
            adal: value(OwnershipField::Adal),
        }
    }
}

/// Binding to the data source that serves a catalog subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceBinding {
    #[serde(alias = "type")]
    pub source_type: SourceType,

    /// Source-specific connection parameters (never credentials)
    #[serde(default, alias = "config")]
    pub connection: BTreeMap<String, JsonValue>,

    /// Query/access template rendered against the requesting moniker
    #[serde(default, alias = "query_template")]
    pub query: Option<String>,

    #[serde(default = "default_read_only")]
    pub read_only: bool,

    /// Restricts the operations a caller may perform; `None` allows all
    #[serde(default)]
    pub allowed_operations: Option<Vec<String>>,

    /// Free-form description of the payload the source returns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<BTreeMap<String, JsonValue>>,
}

fn default_read_only() -> bool {
    true
}

impl SourceBinding {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            connection: BTreeMap::new(),
            query: None,
            read_only: true,
            allowed_operations: None,
            schema: None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_connection(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.connection.insert(key.into(), value.into());
        self
    }
}

/// Data quality information for a catalog node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataQuality {
    pub dq_owner: Option<String>,
    /// 0-100 when measured
    pub quality_score: Option<f64>,
    pub validation_rules: Vec<String>,
    pub known_issues: Vec<String>,
    /// ISO timestamp of the last DQ check
    pub last_validated: Option<String>,
}

/// Service level agreement for a data source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sla {
    /// e.g. "T+1", "15min", "real-time"
    pub freshness: Option<String>,
    pub availability: Option<String>,
    pub support_hours: Option<String>,
    pub escalation_contact: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Freshness {
    pub last_loaded: Option<String>,
    pub refresh_schedule: Option<String>,
    pub source_system: Option<String>,
    pub upstream_dependencies: Vec<String>,
}

/// One column of a dataset, described for discovery tools and agents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// e.g. "string", "float", "date"
    #[serde(alias = "type")]
    pub data_type: String,
    #[serde(default)]
    pub description: String,
    /// e.g. "identifier", "measure", "dimension", "timestamp"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub example: Option<String>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// Catalog path of the referenced dataset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
}

fn default_nullable() -> bool {
    true
}

/// Machine-readable structure and semantics of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSchema {
    pub columns: Vec<ColumnSchema>,
    pub description: String,
    pub semantic_tags: Vec<String>,
    pub primary_key: Vec<String>,
    pub use_cases: Vec<String>,
    pub examples: Vec<String>,
    pub related_monikers: Vec<String>,
    /// e.g. "daily", "per-security"
    pub granularity: Option<String>,
    /// e.g. "1K-10K"
    pub typical_row_count: Option<String>,
    pub update_frequency: Option<String>,
}

impl DataSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// A node in the catalog hierarchy.
///
/// Nodes are stored flat, keyed by path; parents and children are found by
/// prefix matching over the paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogNode {
    /// Full path (e.g. "market-data/prices/equity"); filled from the catalog key
    #[serde(skip_deserializing)]
    pub path: String,

    pub display_name: String,
    pub description: String,

    pub ownership: Ownership,

    #[serde(alias = "binding")]
    pub source_binding: Option<SourceBinding>,

    pub data_quality: Option<DataQuality>,
    pub sla: Option<Sla>,
    pub freshness: Option<Freshness>,
    #[serde(alias = "schema")]
    pub data_schema: Option<DataSchema>,

    /// Data classification for governance
    pub classification: String,

    pub tags: BTreeSet<String>,

    /// Leaf nodes are actual datasets, others are categories
    pub is_leaf: bool,

    pub metadata: BTreeMap<String, JsonValue>,
}

impl Default for CatalogNode {
    fn default() -> Self {
        Self {
            path: String::new(),
            display_name: String::new(),
            description: String::new(),
            ownership: Ownership::default(),
            source_binding: None,
            data_quality: None,
            sla: None,
            freshness: None,
            data_schema: None,
            classification: "internal".to_string(),
            tags: BTreeSet::new(),
            is_leaf: false,
            metadata: BTreeMap::new(),
        }
    }
}

impl CatalogNode {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    pub fn with_ownership(mut self, ownership: Ownership) -> Self {
        self.ownership = ownership;
        self
    }

    pub fn with_binding(mut self, binding: SourceBinding) -> Self {
        self.source_binding = Some(binding);
        self
    }
}
