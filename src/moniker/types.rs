//! Structured moniker types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use url::form_urlencoded;

use super::parser::parse_moniker;
use super::version::VersionType;
use crate::error::ParseError;

/// Scheme prefix accepted (and produced by [`Moniker::to_uri`]).
pub const MONIKER_SCHEME: &str = "moniker://";

/// A parsed moniker.
///
/// Format: `[namespace@]domain[.subdomain]/seg1/.../segN[@version][/vN][?k=v&...]`
///
/// Examples:
/// - `market-data/prices/equity/AAPL`
/// - `commodities.derivatives/crypto/ETH@20260115/v2`
/// - `verified@reference.security/ISIN/US0378331005@latest`
/// - `holdings/positions/20260115/fund_alpha?format=json`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Moniker {
    /// Access scope (e.g. "verified", "user", "trading-desk")
    pub namespace: Option<String>,

    /// Data domain: the first path component up to its first '.'
    pub domain: String,

    /// Remainder of the first path component after its first '.'
    pub subdomain: Option<String>,

    /// Path segments after the domain (never empty)
    pub segments: Vec<String>,

    /// Point-in-time or symbolic version from the `@` suffix
    pub version: Option<String>,

    /// Schema revision from the `/vN` suffix
    pub revision: Option<u32>,

    /// Query parameters, ordered by key
    pub params: BTreeMap<String, String>,
}

impl Moniker {
    /// Parse a moniker string.
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parse_moniker(input)
    }

    /// Path components used for catalog matching: domain, subdomain (if any),
    /// then each segment.
    pub fn path_components(&self) -> Vec<String> {
        let mut components = Vec::with_capacity(self.segments.len() + 2);
        components.push(self.domain.clone());
        if let Some(sub) = &self.subdomain {
            components.push(sub.clone());
        }
        components.extend(self.segments.iter().cloned());
        components
    }

    /// The first path component as written (`domain[.subdomain]`).
    pub fn domain_path(&self) -> String {
        match &self.subdomain {
            Some(sub) => format!("{}.{}", self.domain, sub),
            None => self.domain.clone(),
        }
    }

    /// Path without namespace, version, revision or params.
    pub fn canonical_path(&self) -> String {
        let mut path = self.domain_path();
        for seg in &self.segments {
            path.push('/');
            path.push_str(seg);
        }
        path
    }

    /// Canonical form with the `moniker://` scheme.
    pub fn to_uri(&self) -> String {
        format!("{}{}", MONIKER_SCHEME, self)
    }

    /// Semantic classification of the version suffix.
    pub fn version_type(&self) -> Option<VersionType> {
        self.version.as_deref().map(VersionType::classify)
    }
}

impl fmt::Display for Moniker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ns) = &self.namespace {
            write!(f, "{}@", ns)?;
        }
        f.write_str(&self.canonical_path())?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        if let Some(revision) = self.revision {
            write!(f, "/v{}", revision)?;
        }
        if !self.params.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.params.iter())
                .finish();
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}

impl FromStr for Moniker {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_moniker(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Moniker {
        Moniker {
            namespace: Some("verified".into()),
            domain: "reference".into(),
            subdomain: Some("security".into()),
            segments: vec!["ISIN".into(), "US0378331005".into()],
            version: Some("latest".into()),
            revision: Some(2),
            params: BTreeMap::from([("format".to_string(), "json".to_string())]),
        }
    }

    #[test]
    fn test_display_canonical_form() {
        assert_eq!(
            sample().to_string(),
            "verified@reference.security/ISIN/US0378331005@latest/v2?format=json"
        );
    }

    #[test]
    fn test_to_uri_adds_scheme() {
        assert!(sample().to_uri().starts_with("moniker://verified@"));
    }

    #[test]
    fn test_path_components_split_domain() {
        assert_eq!(
            sample().path_components(),
            vec!["reference", "security", "ISIN", "US0378331005"]
        );
        assert_eq!(sample().canonical_path(), "reference.security/ISIN/US0378331005");
    }

    #[test]
    fn test_params_are_encoded() {
        let mut m = sample();
        m.params.insert("note".into(), "a b&c".into());
        let rendered = m.to_string();
        assert!(rendered.ends_with("?format=json&note=a+b%26c"));
        assert_eq!(rendered.parse::<Moniker>().unwrap(), m);
    }
}
