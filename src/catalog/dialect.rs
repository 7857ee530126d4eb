//! Query dialects for date-aware template placeholders.
//!
//! SQL dialects render expressions evaluated by the database
//! (`DATEADD(...)`, `SYSDATE - 7`). The REST dialect has no expression
//! language, so it computes ISO dates from `today` instead.

use chrono::{Days, Months, NaiveDate};

use crate::moniker::{LookbackUnit, VersionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Snowflake,
    Oracle,
    Rest,
}

impl Dialect {
    pub fn current_date(&self, today: NaiveDate) -> String {
        match self {
            Dialect::Snowflake => "CURRENT_DATE()".to_string(),
            Dialect::Oracle => "SYSDATE".to_string(),
            Dialect::Rest => today.format("%Y-%m-%d").to_string(),
        }
    }

    /// Date literal for an already validated date.
    pub fn date_literal(&self, date: NaiveDate) -> String {
        match self {
            Dialect::Snowflake | Dialect::Oracle => {
                format!("TO_DATE('{}', 'YYYYMMDD')", date.format("%Y%m%d"))
            }
            Dialect::Rest => date.format("%Y-%m-%d").to_string(),
        }
    }

    /// Start of a lookback window ending today.
    pub fn lookback_start(&self, value: u32, unit: LookbackUnit, today: NaiveDate) -> String {
        match self {
            Dialect::Snowflake => {
                let part = match unit {
                    LookbackUnit::Year => "YEAR",
                    LookbackUnit::Month => "MONTH",
                    LookbackUnit::Week => "WEEK",
                    LookbackUnit::Day => "DAY",
                };
                format!("DATEADD('{}', -{}, CURRENT_DATE())", part, value)
            }
            Dialect::Oracle => {
                let value = u64::from(value);
                match unit {
                    LookbackUnit::Year => format!("ADD_MONTHS(SYSDATE, -{})", value * 12),
                    LookbackUnit::Month => format!("ADD_MONTHS(SYSDATE, -{})", value),
                    LookbackUnit::Week => format!("SYSDATE - {}", value * 7),
                    LookbackUnit::Day => format!("SYSDATE - {}", value),
                }
            }
            Dialect::Rest => rest_lookback(value, unit, today)
                .format("%Y-%m-%d")
                .to_string(),
        }
    }

    /// Filter that matches everything.
    pub fn no_filter(&self) -> &'static str {
        match self {
            Dialect::Snowflake | Dialect::Oracle => "1=1",
            Dialect::Rest => "",
        }
    }

    /// Filter fragment restricting `column` to the window named by a version.
    ///
    /// REST has no column syntax; it renders the bare date parameter value.
    pub fn date_filter(
        &self,
        column: &str,
        version: Option<&VersionType>,
        today: NaiveDate,
    ) -> String {
        match (self, version) {
            (Dialect::Rest, Some(VersionType::Lookback { value, unit })) => {
                self.lookback_start(*value, *unit, today)
            }
            (Dialect::Rest, Some(VersionType::Date { date })) => self.date_literal(*date),
            (_, Some(VersionType::Lookback { value, unit })) => {
                format!("{} >= {}", column, self.lookback_start(*value, *unit, today))
            }
            (_, Some(VersionType::Date { date })) => {
                format!("{} = {}", column, self.date_literal(*date))
            }
            _ => self.no_filter().to_string(),
        }
    }
}

fn rest_lookback(value: u32, unit: LookbackUnit, today: NaiveDate) -> NaiveDate {
    let shifted = match unit {
        LookbackUnit::Year => value
            .checked_mul(12)
            .and_then(|months| today.checked_sub_months(Months::new(months))),
        LookbackUnit::Month => today.checked_sub_months(Months::new(value)),
        LookbackUnit::Week => today.checked_sub_days(Days::new(u64::from(value) * 7)),
        LookbackUnit::Day => today.checked_sub_days(Days::new(u64::from(value))),
    };
    shifted.unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 5).unwrap()
    }

    #[test]
    fn test_snowflake_lookback() {
        assert_eq!(
            Dialect::Snowflake.lookback_start(3, LookbackUnit::Month, today()),
            "DATEADD('MONTH', -3, CURRENT_DATE())"
        );
    }

    #[test]
    fn test_oracle_lookback_units() {
        assert_eq!(
            Dialect::Oracle.lookback_start(1, LookbackUnit::Year, today()),
            "ADD_MONTHS(SYSDATE, -12)"
        );
        assert_eq!(
            Dialect::Oracle.lookback_start(2, LookbackUnit::Week, today()),
            "SYSDATE - 14"
        );
    }

    #[test]
    fn test_rest_lookback_is_computed() {
        assert_eq!(
            Dialect::Rest.lookback_start(3, LookbackUnit::Month, today()),
            "2025-11-05"
        );
        assert_eq!(
            Dialect::Rest.lookback_start(1, LookbackUnit::Week, today()),
            "2026-01-29"
        );
        assert_eq!(Dialect::Rest.current_date(today()), "2026-02-05");
    }

    #[test]
    fn test_date_literal() {
        let d = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert_eq!(
            Dialect::Oracle.date_literal(d),
            "TO_DATE('20260115', 'YYYYMMDD')"
        );
        assert_eq!(Dialect::Rest.date_literal(d), "2026-01-15");
    }

    #[test]
    fn test_date_filter_variants() {
        let lookback = VersionType::classify("3M");
        let date = VersionType::classify("20260115");
        assert_eq!(
            Dialect::Snowflake.date_filter("trade_date", Some(&lookback), today()),
            "trade_date >= DATEADD('MONTH', -3, CURRENT_DATE())"
        );
        assert_eq!(
            Dialect::Snowflake.date_filter("trade_date", Some(&date), today()),
            "trade_date = TO_DATE('20260115', 'YYYYMMDD')"
        );
        assert_eq!(
            Dialect::Oracle.date_filter("trade_date", Some(&VersionType::All), today()),
            "1=1"
        );
        assert_eq!(Dialect::Rest.date_filter("trade_date", None, today()), "");
        assert_eq!(
            Dialect::Rest.date_filter("trade_date", Some(&lookback), today()),
            "2025-11-05"
        );
    }
}
