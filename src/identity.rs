//! Caller identity taken from request headers.

use serde::{Deserialize, Serialize};

pub const APP_ID_HEADER: &str = "x-app-id";
pub const TEAM_HEADER: &str = "x-team";

/// Who is asking. Both parts are optional; anonymous callers are allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CallerIdentity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
}

impl CallerIdentity {
    pub fn new(app_id: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            app_id: non_empty(app_id.into()),
            team: non_empty(team.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Read `x-app-id` and `x-team` from header pairs, ignoring name case.
    /// Blank values count as absent; the last occurrence of a header wins.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut identity = Self::default();
        for (name, value) in headers {
            let name = name.as_ref().trim();
            if name.eq_ignore_ascii_case(APP_ID_HEADER) {
                identity.app_id = non_empty(value.as_ref().to_string());
            } else if name.eq_ignore_ascii_case(TEAM_HEADER) {
                identity.team = non_empty(value.as_ref().to_string());
            }
        }
        identity
    }

    pub fn is_anonymous(&self) -> bool {
        self.app_id.is_none() && self.team.is_none()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
