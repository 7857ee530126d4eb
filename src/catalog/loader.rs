//! Catalog definitions loaded from YAML.
//!
//! A catalog file is a mapping of path to node definition:
//!
//! ```yaml
//! prices:
//!   ownership:
//!     accountable_owner: jane@firm.com
//! prices.equity:
//!   source_binding:
//!     type: snowflake
//!     query: "SELECT * FROM equity WHERE symbol = '{segments[0]}'"
//! reference:      # empty nodes are allowed
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::registry::CatalogRegistry;
use super::types::CatalogNode;

type Definitions = Vec<(String, CatalogNode)>;

fn parse_definitions(content: &str) -> Result<Definitions> {
    let raw: Option<BTreeMap<String, Option<CatalogNode>>> = serde_yaml::from_str(content)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(path, node)| (path, node.unwrap_or_default()))
        .collect())
}

/// Build a registry from YAML text.
pub fn load_catalog_str(content: &str) -> Result<CatalogRegistry> {
    let definitions = parse_definitions(content).context("Failed to parse catalog YAML")?;
    Ok(CatalogRegistry::from_nodes(definitions)?)
}

/// Build a registry from a YAML file, or from every `.yaml`/`.yml` file
/// below a directory.
pub fn load_catalog(path: &Path) -> Result<CatalogRegistry> {
    let mut files = Vec::new();
    if path.is_dir() {
        collect_yaml_files(path, &mut files)?;
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut definitions = Definitions::new();
    for file in &files {
        let content = std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {:?}", file))?;
        let parsed =
            parse_definitions(&content).with_context(|| format!("Failed to parse {:?}", file))?;
        debug!("Loaded {} catalog nodes from {:?}", parsed.len(), file);
        definitions.extend(parsed);
    }

    let registry = CatalogRegistry::from_nodes(definitions)
        .with_context(|| format!("Invalid catalog in {:?}", path))?;
    info!(
        nodes = registry.len(),
        files = files.len(),
        "Loaded catalog from {:?}",
        path
    );
    Ok(registry)
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read directory {:?}", dir))?;
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if path
            .extension()
            .map(|e| e == "yaml" || e == "yml")
            .unwrap_or(false)
        {
            out.push(path);
        }
    }
    Ok(())
}
