//! Usage event types.
//!
//! One event per resolve or reported access. Events are immutable once
//! built and cheap to move through the channel; serialization happens in
//! the sink, off the request path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use uuid::Uuid;

use crate::catalog::{Ownership, ResolutionResult, SourceType};
use crate::error::TelemetryError;
use crate::identity::CallerIdentity;

/// Longest error message carried by an event, in characters.
pub const MAX_ERROR_LEN: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Resolve,
    Access,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Resolve => "resolve",
            Operation::Access => "access",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Error,
    NotFound,
}

/// One resolve or access, as reported to the telemetry sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub timestamp: DateTime<Utc>,
    pub request_id: Uuid,
    pub caller: CallerIdentity,
    pub moniker: String,
    pub operation: Operation,
    pub outcome: Outcome,
    pub source_type: Option<SourceType>,
    pub latency_ms: u64,
    /// Effective ownership at the time of the request
    pub ownership: Option<Ownership>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Rows returned, for access events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl UsageEvent {
    /// Successful resolution.
    pub fn resolved(
        request_id: Uuid,
        caller: CallerIdentity,
        result: &ResolutionResult,
        latency: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            caller,
            moniker: result.moniker.clone(),
            operation: Operation::Resolve,
            outcome: Outcome::Success,
            source_type: Some(result.source_type),
            latency_ms: latency.as_millis() as u64,
            ownership: Some(result.ownership.ownership()),
            error: None,
            row_count: None,
        }
    }

    /// Failed resolution; `not_found` selects the outcome.
    pub fn resolve_failed(
        request_id: Uuid,
        caller: CallerIdentity,
        moniker: impl Into<String>,
        not_found: bool,
        error: &str,
        latency: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            request_id,
            caller,
            moniker: moniker.into(),
            operation: Operation::Resolve,
            outcome: if not_found {
                Outcome::NotFound
            } else {
                Outcome::Error
            },
            source_type: None,
            latency_ms: latency.as_millis() as u64,
            ownership: None,
            error: Some(truncate_error(error)),
            row_count: None,
        }
    }

    /// Build an event from a client-reported access payload.
    ///
    /// `timestamp`, `moniker`, `operation` and `outcome` are required.
    /// `caller` may be given as an object or as top-level `app_id`/`team`;
    /// an explicit `caller` argument fills whatever the payload leaves out.
    pub fn from_access_payload(
        payload: JsonValue,
        caller: &CallerIdentity,
    ) -> Result<Self, TelemetryError> {
        if !payload.is_object() {
            return Err(TelemetryError::Validation(
                "payload must be a JSON object".to_string(),
            ));
        }
        let raw: AccessPayload = serde_json::from_value(payload)
            .map_err(|e| TelemetryError::Validation(e.to_string()))?;

        let timestamp = raw.timestamp.ok_or_else(|| missing("timestamp"))?;
        let moniker = raw
            .moniker
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| missing("moniker"))?;
        let operation = raw.operation.ok_or_else(|| missing("operation"))?;
        let outcome = raw.outcome.ok_or_else(|| missing("outcome"))?;

        let mut reported = raw.caller.unwrap_or_default();
        if reported.app_id.is_none() {
            reported.app_id = raw.app_id.or_else(|| caller.app_id.clone());
        }
        if reported.team.is_none() {
            reported.team = raw.team.or_else(|| caller.team.clone());
        }

        Ok(Self {
            timestamp,
            request_id: raw.request_id.unwrap_or_else(Uuid::new_v4),
            caller: reported,
            moniker,
            operation,
            outcome,
            source_type: raw.source_type,
            latency_ms: raw.latency_ms.unwrap_or(0),
            ownership: raw.ownership,
            error: raw.error.as_deref().map(truncate_error),
            row_count: raw.row_count,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AccessPayload {
    timestamp: Option<DateTime<Utc>>,
    request_id: Option<Uuid>,
    caller: Option<CallerIdentity>,
    app_id: Option<String>,
    team: Option<String>,
    moniker: Option<String>,
    operation: Option<Operation>,
    outcome: Option<Outcome>,
    source_type: Option<SourceType>,
    latency_ms: Option<u64>,
    ownership: Option<Ownership>,
    error: Option<String>,
    row_count: Option<u64>,
}

fn missing(field: &str) -> TelemetryError {
    TelemetryError::Validation(format!("missing required field '{}'", field))
}

/// Cut `message` to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_LEN).collect()
}
