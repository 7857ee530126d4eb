//! Version suffix classification.
//!
//! The `@version` suffix carries different meanings depending on its shape:
//! a calendar date, a symbolic tag, a lookback window or a sampling
//! frequency. Query templates branch on this classification.

use chrono::NaiveDate;
use nom::{
    character::complete::{digit1, one_of},
    combinator::all_consuming,
    sequence::pair,
    IResult,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a lookback window (`@3M`, `@1Y`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookbackUnit {
    Year,
    Month,
    Week,
    Day,
}

impl LookbackUnit {
    pub fn as_char(&self) -> char {
        match self {
            LookbackUnit::Year => 'Y',
            LookbackUnit::Month => 'M',
            LookbackUnit::Week => 'W',
            LookbackUnit::Day => 'D',
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'Y' => Some(LookbackUnit::Year),
            'M' => Some(LookbackUnit::Month),
            'W' => Some(LookbackUnit::Week),
            'D' => Some(LookbackUnit::Day),
            _ => None,
        }
    }
}

/// Sampling frequency (`@daily`, `@weekly`, `@monthly`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

/// Semantic meaning of a version suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VersionType {
    /// YYYYMMDD calendar date
    Date { date: NaiveDate },
    /// `latest`
    Latest,
    /// `<digits><Y|M|W|D>`
    Lookback { value: u32, unit: LookbackUnit },
    /// `daily` / `weekly` / `monthly`
    Frequency { frequency: Frequency },
    /// `all`: the full series
    All,
    /// Anything else
    Custom { value: String },
}

impl VersionType {
    /// Classify a raw version string.
    pub fn classify(version: &str) -> Self {
        if let Some(date) = parse_yyyymmdd(version) {
            return VersionType::Date { date };
        }
        match version.to_ascii_lowercase().as_str() {
            "latest" => return VersionType::Latest,
            "all" => return VersionType::All,
            "daily" => {
                return VersionType::Frequency {
                    frequency: Frequency::Daily,
                }
            }
            "weekly" => {
                return VersionType::Frequency {
                    frequency: Frequency::Weekly,
                }
            }
            "monthly" => {
                return VersionType::Frequency {
                    frequency: Frequency::Monthly,
                }
            }
            _ => {}
        }
        if let Ok((_, (digits, unit))) = lookback(version) {
            if let (Ok(value), Some(unit)) = (digits.parse::<u32>(), LookbackUnit::from_char(unit))
            {
                return VersionType::Lookback { value, unit };
            }
        }
        VersionType::Custom {
            value: version.to_string(),
        }
    }

    /// Short name used by the `{version_type}` placeholder.
    pub fn name(&self) -> &'static str {
        match self {
            VersionType::Date { .. } => "date",
            VersionType::Latest => "latest",
            VersionType::Lookback { .. } => "lookback",
            VersionType::Frequency { .. } => "frequency",
            VersionType::All => "all",
            VersionType::Custom { .. } => "custom",
        }
    }
}

impl fmt::Display for VersionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse an 8-digit YYYYMMDD string into a date.
pub fn parse_yyyymmdd(value: &str) -> Option<NaiveDate> {
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y%m%d").ok()
}

fn lookback(input: &str) -> IResult<&str, (&str, char)> {
    all_consuming(pair(digit1, one_of("YMWDymwd")))(input)
}
