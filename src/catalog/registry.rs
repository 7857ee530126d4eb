//! Catalog registry: the flat path → node arena and the lookups over it.
//!
//! Paths are compared by component: the first `/`-component splits at its
//! first `.`, so `prices` is an ancestor of `prices.equity`, which is an
//! ancestor of `prices.equity/AAPL`. No parent pointers are stored; every
//! hierarchy question is answered by prefix lookups into the ordered map.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet};

use super::template::{self, TemplateContext};
use super::types::{
    CatalogNode, DataQuality, DataSchema, Freshness, InheritedValue, Ownership, OwnershipField,
    ResolvedOwnership, Sla, SourceBinding, SourceType,
};
use crate::error::{CatalogError, ResolveError};
use crate::moniker::{is_valid_segment, Moniker};

type Components = Vec<String>;

/// Outcome of resolving a moniker against the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Canonical moniker string
    pub moniker: String,
    /// Canonical path (no namespace, version or params)
    pub path: String,
    /// Deepest catalog node matched by the request
    pub matched_path: String,
    /// Node whose binding serves the request
    pub binding_path: String,
    /// Request path below the binding node
    pub sub_path: Option<String>,
    pub source_type: SourceType,
    pub connection: BTreeMap<String, JsonValue>,
    /// Rendered query, when the binding has a template
    pub query: Option<String>,
    pub ownership: ResolvedOwnership,
    pub read_only: bool,
}

/// Summary of the binding that serves a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSummary {
    pub binding_path: String,
    pub source_type: SourceType,
    pub read_only: bool,
    pub has_query: bool,
    pub inherited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_operations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<BTreeMap<String, JsonValue>>,
}

/// Display metadata for a catalog node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub path: String,
    pub display_name: String,
    pub description: String,
    pub classification: String,
    pub tags: BTreeSet<String>,
    pub is_leaf: bool,
    /// Ownership declared on the node itself
    pub ownership: Ownership,
    pub effective_ownership: ResolvedOwnership,
    pub binding: Option<BindingSummary>,
    pub data_quality: Option<DataQuality>,
    pub sla: Option<Sla>,
    pub freshness: Option<Freshness>,
    pub data_schema: Option<DataSchema>,
    pub metadata: BTreeMap<String, JsonValue>,
    pub has_children: bool,
}

/// One step of an ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEntry {
    pub path: String,
    pub display_name: String,
    pub ownership: Ownership,
    pub source_type: Option<SourceType>,
}

/// Split a catalog path into matching components.
pub fn path_components(path: &str) -> Result<Components, CatalogError> {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(CatalogError::InvalidPath(path.to_string()));
    }
    let mut parts = trimmed.split('/');
    let first = parts.next().unwrap_or_default();
    let mut components = Vec::new();
    match first.split_once('.') {
        Some((domain, sub)) => {
            components.push(domain.to_string());
            components.push(sub.to_string());
        }
        None => components.push(first.to_string()),
    }
    components.extend(parts.map(str::to_string));
    if components.iter().any(|c| !is_valid_segment(c)) {
        return Err(CatalogError::InvalidPath(path.to_string()));
    }
    Ok(components)
}

/// Immutable catalog of nodes keyed by component path.
#[derive(Debug, Clone, Default)]
pub struct CatalogRegistry {
    nodes: BTreeMap<Components, CatalogNode>,
}

impl CatalogRegistry {
    /// Build a registry from `(path, node)` definitions.
    pub fn from_nodes<I, P>(definitions: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (P, CatalogNode)>,
        P: Into<String>,
    {
        let mut nodes: BTreeMap<Components, CatalogNode> = BTreeMap::new();
        for (path, mut node) in definitions {
            let path = path.into();
            let components = path_components(&path)?;
            if let Some(existing) = nodes.get(&components) {
                return Err(CatalogError::DuplicatePath {
                    path,
                    existing: existing.path.clone(),
                });
            }
            node.path = path.trim().trim_matches('/').to_string();
            if node.display_name.is_empty() {
                node.display_name = node
                    .path
                    .rsplit(['/', '.'])
                    .next()
                    .unwrap_or_default()
                    .to_string();
            }
            nodes.insert(components, node);
        }
        Ok(Self { nodes })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Exact lookup by path.
    pub fn get(&self, path: &str) -> Option<&CatalogNode> {
        let components = path_components(path).ok()?;
        self.nodes.get(&components)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CatalogNode> {
        self.nodes.values()
    }

    /// Longest catalog path that is a component prefix of `components`.
    fn longest_prefix(&self, components: &[String]) -> Option<(&[String], &CatalogNode)> {
        (1..=components.len()).rev().find_map(|n| {
            self.nodes
                .get_key_value(&components[..n])
                .map(|(key, node)| (key.as_slice(), node))
        })
    }

    /// Present nodes from `components` up to the root, nearest first.
    fn ancestors_or_self<'a>(
        &'a self,
        components: &'a [String],
    ) -> impl Iterator<Item = (usize, &'a CatalogNode)> + 'a {
        (1..=components.len())
            .rev()
            .filter_map(move |n| self.nodes.get(&components[..n]).map(|node| (n, node)))
    }

    /// Nearest present proper ancestor.
    fn parent_len(&self, components: &[String]) -> Option<usize> {
        (1..components.len())
            .rev()
            .find(|n| self.nodes.contains_key(&components[..*n]))
    }

    /// Effective ownership: each field independently takes the nearest
    /// defined value walking toward the root.
    fn effective_ownership(&self, components: &[String]) -> ResolvedOwnership {
        let mut resolved = ResolvedOwnership::default();
        for (_, node) in self.ancestors_or_self(components) {
            for field in OwnershipField::ALL {
                let slot = resolved.slot_mut(field);
                if slot.is_none() {
                    if let Some(value) = node.ownership.get(field) {
                        *slot = Some(InheritedValue {
                            value: value.to_string(),
                            defined_at: node.path.clone(),
                        });
                    }
                }
            }
        }
        resolved
    }

    /// Nearest ancestor-or-self with a source binding. Bindings are never
    /// merged; the first one found is used whole.
    fn binding_node<'a>(
        &'a self,
        components: &'a [String],
    ) -> Option<(usize, &'a CatalogNode, &'a SourceBinding)> {
        self.ancestors_or_self(components).find_map(|(len, node)| {
            node.source_binding
                .as_ref()
                .map(|binding| (len, node, binding))
        })
    }

    /// Resolve a moniker to its source binding, rendered query and ownership.
    pub fn resolve(&self, moniker: &Moniker) -> Result<ResolutionResult, ResolveError> {
        self.resolve_at(moniker, Utc::now().date_naive())
    }

    /// As [`resolve`](Self::resolve), with an explicit date for date-aware
    /// placeholders.
    pub fn resolve_at(
        &self,
        moniker: &Moniker,
        today: NaiveDate,
    ) -> Result<ResolutionResult, ResolveError> {
        let components = moniker.path_components();
        let path = moniker.canonical_path();

        let (matched_components, matched) = self
            .longest_prefix(&components)
            .ok_or_else(|| ResolveError::NotFound { path: path.clone() })?;

        let (binding_len, binding_node, binding) = self
            .binding_node(matched_components)
            .ok_or_else(|| ResolveError::NoBinding {
                path: path.clone(),
                matched: matched.path.clone(),
            })?;

        let residual = &components[binding_len..];
        let query = match &binding.query {
            Some(tpl) => {
                let ctx = TemplateContext::new(moniker, residual, binding.source_type, today);
                Some(
                    template::render(tpl, &ctx).map_err(|source| ResolveError::Template {
                        binding: binding_node.path.clone(),
                        source,
                    })?,
                )
            }
            None => None,
        };

        Ok(ResolutionResult {
            moniker: moniker.to_string(),
            path,
            matched_path: matched.path.clone(),
            binding_path: binding_node.path.clone(),
            sub_path: (!residual.is_empty()).then(|| residual.join("/")),
            source_type: binding.source_type,
            connection: binding.connection.clone(),
            query,
            ownership: self.effective_ownership(matched_components),
            read_only: binding.read_only,
        })
    }

    /// Deepest node matching `path`, with its stored key.
    fn lookup(&self, path: &str) -> Result<(&[String], &CatalogNode), ResolveError> {
        let not_found = || ResolveError::NotFound {
            path: path.to_string(),
        };
        let components = path_components(path).map_err(|_| not_found())?;
        self.longest_prefix(&components).ok_or_else(not_found)
    }

    /// Metadata, own and effective ownership of the deepest node matching
    /// `path`.
    pub fn describe(&self, path: &str) -> Result<NodeDescription, ResolveError> {
        let (key, node) = self.lookup(path)?;
        let binding = self
            .binding_node(key)
            .map(|(len, bound, b)| BindingSummary {
                binding_path: bound.path.clone(),
                source_type: b.source_type,
                read_only: b.read_only,
                has_query: b.query.is_some(),
                inherited: len != key.len(),
                allowed_operations: b.allowed_operations.clone(),
                schema: b.schema.clone(),
            });
        Ok(NodeDescription {
            path: node.path.clone(),
            display_name: node.display_name.clone(),
            description: node.description.clone(),
            classification: node.classification.clone(),
            tags: node.tags.clone(),
            is_leaf: node.is_leaf,
            ownership: node.ownership.clone(),
            effective_ownership: self.effective_ownership(key),
            binding,
            data_quality: node.data_quality.clone(),
            sla: node.sla.clone(),
            freshness: node.freshness.clone(),
            data_schema: node.data_schema.clone(),
            metadata: node.metadata.clone(),
            has_children: !self.children_of(key).is_empty(),
        })
    }

    fn children_of(&self, target: &[String]) -> Vec<String> {
        self.nodes
            .range(target.to_vec()..)
            .take_while(|(k, _)| k.starts_with(target))
            .filter(|(k, _)| k.len() > target.len() && self.parent_len(k) == Some(target.len()))
            .map(|(_, node)| node.path.clone())
            .collect()
    }

    /// Direct children of `path`; `""` or `"/"` lists the top-level nodes.
    pub fn list(&self, path: &str) -> Result<Vec<String>, ResolveError> {
        if path.trim().trim_matches('/').is_empty() {
            return Ok(self
                .nodes
                .iter()
                .filter(|(k, _)| self.parent_len(k).is_none())
                .map(|(_, node)| node.path.clone())
                .collect());
        }
        let components = path_components(path).map_err(|_| ResolveError::NotFound {
            path: path.to_string(),
        })?;
        if !self.nodes.contains_key(&components) {
            return Err(ResolveError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(self.children_of(&components))
    }

    /// Ancestor chain from the root down to the deepest node matching
    /// `path`, each with its own unmerged ownership.
    pub fn lineage(&self, path: &str) -> Result<Vec<LineageEntry>, ResolveError> {
        let (key, _) = self.lookup(path)?;
        let mut chain: Vec<LineageEntry> = self
            .ancestors_or_self(key)
            .map(|(_, node)| LineageEntry {
                path: node.path.clone(),
                display_name: node.display_name.clone(),
                ownership: node.ownership.clone(),
                source_type: node.source_binding.as_ref().map(|b| b.source_type),
            })
            .collect();
        chain.reverse();
        Ok(chain)
    }
}
