//! Error types for moniker resolution.
//!
//! Each component owns one `thiserror` enum. Parse and resolve errors are
//! client-facing and carry an HTTP status mapping for the service layer;
//! telemetry errors are logged and never reach a resolution caller.

use thiserror::Error;

/// Errors produced while parsing a moniker string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty path: a moniker needs a domain and at least one segment")]
    EmptyPath,

    #[error("invalid revision '{0}': expected 'v' followed by digits")]
    InvalidRevision(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("invalid path segment '{0}': segments start with an alphanumeric and contain only alphanumerics, '_', '-' or '.'")]
    InvalidSegment(String),

    #[error("invalid namespace '{0}': namespaces start with a letter and contain only alphanumerics, '_' or '-'")]
    InvalidNamespace(String),

    #[error("invalid version '{0}': versions are alphanumeric (e.g. 'latest', '20260115', '3M')")]
    InvalidVersion(String),

    #[error("unsupported scheme in '{0}': expected 'moniker://' or no scheme")]
    UnsupportedScheme(String),
}

/// Errors produced while rendering a binding's query template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder '{{{0}}}'")]
    UnknownPlaceholder(String),

    #[error("placeholder '{{{placeholder}}}' references segment {index}, but only {available} residual segment(s) exist")]
    SegmentOutOfRange {
        placeholder: String,
        index: usize,
        available: usize,
    },

    #[error("placeholder '{{{placeholder}}}' expects a YYYYMMDD date, got '{value}'")]
    InvalidDate { placeholder: String, value: String },

    #[error("placeholder '{{{placeholder}}}' needs a query dialect, but source type '{source_type}' has none")]
    NoDialect {
        placeholder: String,
        source_type: String,
    },
}

/// Errors produced by catalog lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no catalog entry matches '{path}'")]
    NotFound { path: String },

    #[error("'{path}' matched catalog node '{matched}', but no source binding exists in its ancestry")]
    NoBinding { path: String, matched: String },

    #[error("query template for binding '{binding}' is misconfigured: {source}")]
    Template {
        binding: String,
        #[source]
        source: TemplateError,
    },
}

/// Errors raised while building a catalog from its definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog paths '{path}' and '{existing}' address the same node")]
    DuplicatePath { path: String, existing: String },

    #[error("invalid catalog path '{0}'")]
    InvalidPath(String),
}

/// Errors inside the telemetry pipeline.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("invalid usage event: {0}")]
    Validation(String),

    #[error("telemetry pipeline is {0}")]
    InvalidState(String),

    #[error("telemetry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("telemetry configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the service-facing contract.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl ServiceError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Parse(_) => 400,
            Self::Resolve(ResolveError::NotFound { .. }) => 404,
            Self::Resolve(ResolveError::NoBinding { .. }) => 422,
            Self::Resolve(ResolveError::Template { .. }) => 500,
        }
    }

    /// True when the request named a path with no catalog entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Resolve(ResolveError::NotFound { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_parse() {
        let err = ServiceError::from(ParseError::EmptyPath);
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn http_status_not_found() {
        let err = ServiceError::from(ResolveError::NotFound { path: "x/y".into() });
        assert_eq!(err.http_status(), 404);
        assert!(err.is_not_found());
    }

    #[test]
    fn http_status_no_binding() {
        let err = ServiceError::from(ResolveError::NoBinding {
            path: "x/y".into(),
            matched: "x".into(),
        });
        assert_eq!(err.http_status(), 422);
        assert!(!err.is_not_found());
    }

    #[test]
    fn http_status_template() {
        let err = ServiceError::from(ResolveError::Template {
            binding: "x".into(),
            source: TemplateError::UnknownPlaceholder("bogus".into()),
        });
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn display_unknown_placeholder() {
        let e = TemplateError::UnknownPlaceholder("bogus".into());
        assert_eq!(e.to_string(), "unknown placeholder '{bogus}'");
    }

    #[test]
    fn display_not_found() {
        let e = ResolveError::NotFound {
            path: "nowhere/at-all".into(),
        };
        assert_eq!(e.to_string(), "no catalog entry matches 'nowhere/at-all'");
    }

    #[test]
    fn display_config_invalid() {
        let e = ConfigError::invalid("telemetry.batch_size", "must be greater than zero");
        assert_eq!(
            e.to_string(),
            "invalid value for 'telemetry.batch_size': must be greater than zero"
        );
    }
}
