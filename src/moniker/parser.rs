//! Moniker string parser.
//!
//! Components are peeled off in a fixed order: scheme, query string,
//! namespace, revision, version, then the path itself. Each step only looks
//! at what the previous steps left behind, so ambiguous input always resolves
//! the same way.

use nom::{
    bytes::complete::take_while,
    character::complete::{alphanumeric1, char, digit1, satisfy},
    combinator::{all_consuming, recognize},
    sequence::{pair, preceded},
    IResult,
};
use std::collections::BTreeMap;
use url::form_urlencoded;

use super::types::{Moniker, MONIKER_SCHEME};
use crate::error::ParseError;

const MAX_SEGMENT_LEN: usize = 128;
const MAX_NAMESPACE_LEN: usize = 64;

/// Parse a full moniker string.
///
/// Format: `[namespace@]domain[.subdomain]/seg1/.../segN[@version][/vN][?k=v&...]`
pub fn parse_moniker(input: &str) -> Result<Moniker, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseError::EmptyPath);
    }

    let (body, query) = match input.split_once('?') {
        Some((body, query)) => (body, Some(query)),
        None => (input, None),
    };

    let body = match body.strip_prefix(MONIKER_SCHEME) {
        Some(rest) => rest,
        None if body.contains("://") => {
            return Err(ParseError::UnsupportedScheme(input.to_string()))
        }
        None => body,
    };

    let (namespace, rest) = split_namespace(body)?;
    let (rest, revision) = split_revision(rest)?;
    let (rest, version) = split_version(rest)?;
    let (domain, subdomain, segments) = split_path(rest)?;

    let params = match query {
        Some(query) => parse_query(query)?,
        None => BTreeMap::new(),
    };

    Ok(Moniker {
        namespace,
        domain,
        subdomain,
        segments,
        version,
        revision,
        params,
    })
}

/// `ns@...` is a namespace only when the `@` comes before the first `/`.
fn split_namespace(body: &str) -> Result<(Option<String>, &str), ParseError> {
    let Some(at) = body.find('@') else {
        return Ok((None, body));
    };
    if body.find('/').is_some_and(|slash| slash < at) {
        return Ok((None, body));
    }

    let namespace = &body[..at];
    if !is_valid_namespace(namespace) {
        return Err(ParseError::InvalidNamespace(namespace.to_string()));
    }
    Ok((Some(namespace.to_string()), &body[at + 1..]))
}

/// A trailing `/v<digits>` component is the revision.
fn split_revision(rest: &str) -> Result<(&str, Option<u32>), ParseError> {
    let Some(slash) = rest.rfind('/') else {
        return Ok((rest, None));
    };
    let last = &rest[slash + 1..];

    if last == "v" {
        return Err(ParseError::InvalidRevision(last.to_string()));
    }
    match revision_token(last) {
        Ok((_, digits)) => {
            let revision = digits
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidRevision(last.to_string()))?;
            Ok((&rest[..slash], Some(revision)))
        }
        Err(_) => Ok((rest, None)),
    }
}

/// A trailing `@value` after the last `/` is the version.
fn split_version(rest: &str) -> Result<(&str, Option<String>), ParseError> {
    let Some(at) = rest.rfind('@') else {
        return Ok((rest, None));
    };
    if rest.rfind('/').is_some_and(|slash| slash > at) {
        return Ok((rest, None));
    }

    let version = &rest[at + 1..];
    if version_token(version).is_err() {
        return Err(ParseError::InvalidVersion(version.to_string()));
    }
    Ok((&rest[..at], Some(version.to_string())))
}

#[allow(clippy::type_complexity)]
fn split_path(rest: &str) -> Result<(String, Option<String>, Vec<String>), ParseError> {
    let trimmed = rest.trim_matches('/');
    if trimmed.is_empty() {
        return Err(ParseError::EmptyPath);
    }

    let mut components = trimmed.split('/');
    let first = components.next().unwrap_or_default();
    if !is_valid_segment(first) {
        return Err(ParseError::InvalidSegment(first.to_string()));
    }
    let (domain, subdomain) = match first.split_once('.') {
        Some((domain, sub)) if is_valid_segment(sub) => (domain.to_string(), Some(sub.to_string())),
        Some(_) => return Err(ParseError::InvalidSegment(first.to_string())),
        None => (first.to_string(), None),
    };

    let segments = components
        .map(|seg| {
            if is_valid_segment(seg) {
                Ok(seg.to_string())
            } else {
                Err(ParseError::InvalidSegment(seg.to_string()))
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if segments.is_empty() {
        return Err(ParseError::EmptyPath);
    }
    Ok((domain, subdomain, segments))
}

/// Parse `k=v&k2=v2`. The last occurrence of a duplicate key wins.
fn parse_query(query: &str) -> Result<BTreeMap<String, String>, ParseError> {
    if query.is_empty() {
        return Err(ParseError::MalformedQuery(
            "'?' must be followed by key=value pairs".to_string(),
        ));
    }

    let mut params = BTreeMap::new();
    for raw in query.split('&') {
        if raw.is_empty() {
            return Err(ParseError::MalformedQuery(format!(
                "empty parameter in '{}'",
                query
            )));
        }
        match raw.split_once('=') {
            Some((key, _)) if !key.is_empty() => {}
            Some(_) => {
                return Err(ParseError::MalformedQuery(format!(
                    "parameter '{}' has an empty key",
                    raw
                )))
            }
            None => {
                return Err(ParseError::MalformedQuery(format!(
                    "parameter '{}' is not a key=value pair",
                    raw
                )))
            }
        }
        for (key, value) in form_urlencoded::parse(raw.as_bytes()) {
            params.insert(key.into_owned(), value.into_owned());
        }
    }
    Ok(params)
}

// ============================================================================
// Lexical tokens
// ============================================================================

fn segment_token(input: &str) -> IResult<&str, &str> {
    all_consuming(recognize(pair(
        satisfy(|c| c.is_ascii_alphanumeric()),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')),
    )))(input)
}

fn namespace_token(input: &str) -> IResult<&str, &str> {
    all_consuming(recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '-')),
    )))(input)
}

fn revision_token(input: &str) -> IResult<&str, &str> {
    all_consuming(preceded(char('v'), digit1))(input)
}

fn version_token(input: &str) -> IResult<&str, &str> {
    all_consuming(alphanumeric1)(input)
}

/// True when `segment` is a well-formed path segment.
pub fn is_valid_segment(segment: &str) -> bool {
    segment.len() <= MAX_SEGMENT_LEN && segment_token(segment).is_ok()
}

/// True when `namespace` is a well-formed namespace.
pub fn is_valid_namespace(namespace: &str) -> bool {
    namespace.len() <= MAX_NAMESPACE_LEN && namespace_token(namespace).is_ok()
}
