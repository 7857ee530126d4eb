//! Query template rendering.
//!
//! Templates carry `{placeholder}` tokens that are substituted from the
//! requesting moniker and the residual path below the binding. Tokens that
//! do not look like placeholders (for example JSON bodies in REST
//! templates) are left untouched; placeholder-shaped tokens that are not
//! recognised fail the render.

use chrono::NaiveDate;
use nom::{
    bytes::complete::take_while1,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt, rest},
    sequence::{delimited, preceded, tuple},
    IResult,
};
use regex::Regex;
use std::sync::LazyLock;

use super::dialect::Dialect;
use super::types::SourceType;
use crate::error::TemplateError;
use crate::moniker::{parse_yyyymmdd, Moniker, VersionType};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*(?:\[[^\]{}]*\])?(?::[^{}]*)?)\}")
        .expect("placeholder pattern is valid")
});

/// Everything a template may draw on.
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    pub moniker: &'a Moniker,
    /// Segments of the request below the binding's own path
    pub residual: &'a [String],
    pub source_type: SourceType,
    pub today: NaiveDate,
}

impl<'a> TemplateContext<'a> {
    pub fn new(
        moniker: &'a Moniker,
        residual: &'a [String],
        source_type: SourceType,
        today: NaiveDate,
    ) -> Self {
        Self {
            moniker,
            residual,
            source_type,
            today,
        }
    }
}

/// Parsed form of one `{...}` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder<'a> {
    Named(&'a str),
    Segment(usize),
    SegmentDate(usize),
    SegmentDateSql(usize),
    IsAllSegment(usize),
    Filter(usize, &'a str),
    DateFilter(&'a str),
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn index(input: &str) -> IResult<&str, usize> {
    delimited(char('['), map_res(digit1, str::parse::<usize>), char(']'))(input)
}

fn placeholder(input: &str) -> IResult<&str, (&str, Option<usize>, Option<&str>)> {
    all_consuming(tuple((ident, opt(index), opt(preceded(char(':'), rest)))))(input)
}

fn classify(token: &str) -> Option<Placeholder<'_>> {
    let (_, parts) = placeholder(token).ok()?;
    let parsed = match parts {
        ("segments", Some(n), None) => Placeholder::Segment(n),
        ("segments", Some(n), Some("date")) => Placeholder::SegmentDate(n),
        ("segment_date_sql", Some(n), None) => Placeholder::SegmentDateSql(n),
        ("is_all", Some(n), None) => Placeholder::IsAllSegment(n),
        ("filter", Some(n), Some(col)) if !col.is_empty() => Placeholder::Filter(n, col),
        ("date_filter", None, Some(col)) if !col.is_empty() => Placeholder::DateFilter(col),
        (name, None, None) => Placeholder::Named(canonical_name(name)),
        _ => return None,
    };
    Some(parsed)
}

fn canonical_name(name: &str) -> &str {
    match name {
        "is_tenor" => "is_lookback",
        "tenor_value" => "lookback_value",
        "tenor_unit" => "lookback_unit",
        other => other,
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, ctx: &TemplateContext<'_>) -> Result<String, TemplateError> {
    let version = ctx.moniker.version_type();
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&template[last..whole.start()]);
        let token = inner.as_str();
        let value = match classify(token) {
            Some(p) => substitute(p, token, ctx, version.as_ref())?,
            None => return Err(TemplateError::UnknownPlaceholder(token.to_string())),
        };
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

fn substitute(
    p: Placeholder<'_>,
    token: &str,
    ctx: &TemplateContext<'_>,
    version: Option<&VersionType>,
) -> Result<String, TemplateError> {
    let m = ctx.moniker;
    let value = match p {
        Placeholder::Named(name) => match name {
            "path" => ctx.residual.join("/"),
            "version" => m.version.clone().unwrap_or_default(),
            "revision" => m.revision.map(|r| r.to_string()).unwrap_or_default(),
            "namespace" => m.namespace.clone().unwrap_or_default(),
            "moniker" => m.to_uri(),
            "version_type" => version.map(|v| v.name().to_string()).unwrap_or_default(),
            "is_date" => flag(matches!(version, Some(VersionType::Date { .. }))),
            "is_latest" => flag(matches!(version, Some(VersionType::Latest))),
            "is_lookback" => flag(matches!(version, Some(VersionType::Lookback { .. }))),
            "is_frequency" => flag(matches!(version, Some(VersionType::Frequency { .. }))),
            "is_all" => flag(matches!(version, Some(VersionType::All))),
            "lookback_value" => match version {
                Some(VersionType::Lookback { value, .. }) => value.to_string(),
                _ => String::new(),
            },
            "lookback_unit" => match version {
                Some(VersionType::Lookback { unit, .. }) => unit.as_char().to_string(),
                _ => String::new(),
            },
            "frequency" => match version {
                Some(VersionType::Frequency { frequency }) => frequency.as_str().to_string(),
                _ => String::new(),
            },
            "current_date" => dialect(token, ctx)?.current_date(ctx.today),
            "version_date" => {
                let d = dialect(token, ctx)?;
                match version {
                    Some(VersionType::Date { date }) => d.date_literal(*date),
                    _ => String::new(),
                }
            }
            "lookback_start_sql" => {
                let d = dialect(token, ctx)?;
                match version {
                    Some(VersionType::Lookback { value, unit }) => {
                        d.lookback_start(*value, *unit, ctx.today)
                    }
                    _ => String::new(),
                }
            }
            _ => return Err(TemplateError::UnknownPlaceholder(token.to_string())),
        },
        Placeholder::Segment(n) => segment(token, ctx, n)?.to_string(),
        Placeholder::SegmentDate(n) => segment_date(token, ctx, n)?
            .format("%Y-%m-%d")
            .to_string(),
        Placeholder::SegmentDateSql(n) => {
            let d = dialect(token, ctx)?;
            d.date_literal(segment_date(token, ctx, n)?)
        }
        Placeholder::IsAllSegment(n) => flag(segment(token, ctx, n)? == "ALL"),
        Placeholder::Filter(n, column) => {
            let d = dialect(token, ctx)?;
            let seg = segment(token, ctx, n)?;
            if seg == "ALL" {
                d.no_filter().to_string()
            } else {
                format!("{} = '{}'", column, seg.replace('\'', "''"))
            }
        }
        Placeholder::DateFilter(column) => {
            dialect(token, ctx)?.date_filter(column, version, ctx.today)
        }
    };
    Ok(value)
}

fn flag(value: bool) -> String {
    let s = if value { "true" } else { "false" };
    s.to_string()
}

fn dialect(token: &str, ctx: &TemplateContext<'_>) -> Result<Dialect, TemplateError> {
    ctx.source_type
        .dialect()
        .ok_or_else(|| TemplateError::NoDialect {
            placeholder: token.to_string(),
            source_type: ctx.source_type.to_string(),
        })
}

fn segment<'c>(
    token: &str,
    ctx: &TemplateContext<'c>,
    index: usize,
) -> Result<&'c str, TemplateError> {
    ctx.residual
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| TemplateError::SegmentOutOfRange {
            placeholder: token.to_string(),
            index,
            available: ctx.residual.len(),
        })
}

fn segment_date(
    token: &str,
    ctx: &TemplateContext<'_>,
    index: usize,
) -> Result<NaiveDate, TemplateError> {
    let raw = segment(token, ctx, index)?;
    parse_yyyymmdd(raw).ok_or_else(|| TemplateError::InvalidDate {
        placeholder: token.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 5).unwrap()
    }

    fn render_for(
        template: &str,
        moniker: &str,
        residual: &[&str],
        source_type: SourceType,
    ) -> Result<String, TemplateError> {
        let m = Moniker::parse(moniker).unwrap();
        let residual: Vec<String> = residual.iter().map(|s| s.to_string()).collect();
        render(
            template,
            &TemplateContext::new(&m, &residual, source_type, today()),
        )
    }

    #[test]
    fn test_segments_and_path() {
        let out = render_for(
            "SELECT * FROM positions WHERE as_of = '{segments[0]}' AND portfolio = '{segments[1]}' -- {path}",
            "holdings/positions/20260115/fund_alpha",
            &["20260115", "fund_alpha"],
            SourceType::Snowflake,
        )
        .unwrap();
        assert_eq!(
            out,
            "SELECT * FROM positions WHERE as_of = '20260115' AND portfolio = 'fund_alpha' -- 20260115/fund_alpha"
        );
    }

    #[test]
    fn test_absent_optionals_render_empty() {
        let out = render_for(
            "[{version}][{revision}][{namespace}][{version_type}]",
            "prices/equity/AAPL",
            &["AAPL"],
            SourceType::Static,
        )
        .unwrap();
        assert_eq!(out, "[][][][]");
    }

    #[test]
    fn test_version_flags_and_aliases() {
        let out = render_for(
            "{is_lookback} {is_tenor} {tenor_value}{lookback_unit} {is_date}",
            "prices/equity/AAPL@3M",
            &["AAPL"],
            SourceType::Snowflake,
        )
        .unwrap();
        assert_eq!(out, "true true 3M false");
    }

    #[test]
    fn test_date_filter_and_version_date() {
        let out = render_for(
            "WHERE {date_filter:trade_date} /* {version_date} */",
            "prices/equity/AAPL@20260115",
            &["AAPL"],
            SourceType::Oracle,
        )
        .unwrap();
        assert_eq!(
            out,
            "WHERE trade_date = TO_DATE('20260115', 'YYYYMMDD') /* TO_DATE('20260115', 'YYYYMMDD') */"
        );
    }

    #[test]
    fn test_filter_all_and_quote_escaping() {
        let out = render_for(
            "{filter[0]:sector} AND {filter[1]:name}",
            "prices/equity/ALL/O-Brien",
            &["ALL", "O-Brien"],
            SourceType::Snowflake,
        )
        .unwrap();
        assert_eq!(out, "1=1 AND name = 'O-Brien'");

        let m = Moniker::parse("prices/equity/x").unwrap();
        let residual = vec!["O'Brien".to_string()];
        let out = render(
            "{filter[0]:name}",
            &TemplateContext::new(&m, &residual, SourceType::Oracle, today()),
        )
        .unwrap();
        assert_eq!(out, "name = 'O''Brien'");
    }

    #[test]
    fn test_segment_dates() {
        let out = render_for(
            "{segments[0]:date} {segment_date_sql[0]} {is_all[1]}",
            "risk/var/20260101/ALL",
            &["20260101", "ALL"],
            SourceType::Rest,
        )
        .unwrap();
        assert_eq!(out, "2026-01-01 2026-01-01 true");

        let err = render_for(
            "{segments[0]:date}",
            "risk/var/notadate",
            &["notadate"],
            SourceType::Rest,
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::InvalidDate { .. }));
    }

    #[test]
    fn test_segment_out_of_range() {
        let err = render_for(
            "{segments[2]}",
            "holdings/positions/20260115",
            &["20260115"],
            SourceType::Snowflake,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TemplateError::SegmentOutOfRange {
                placeholder: "segments[2]".into(),
                index: 2,
                available: 1,
            }
        );
    }

    #[test]
    fn test_unknown_placeholder() {
        let err = render_for("{bogus}", "a/b", &["b"], SourceType::Static).unwrap_err();
        assert_eq!(err, TemplateError::UnknownPlaceholder("bogus".into()));
        let err = render_for("{segments}", "a/b", &["b"], SourceType::Static).unwrap_err();
        assert_eq!(err, TemplateError::UnknownPlaceholder("segments".into()));
    }

    #[test]
    fn test_dialect_required() {
        let err = render_for("{current_date}", "a/b", &["b"], SourceType::Excel).unwrap_err();
        assert!(matches!(err, TemplateError::NoDialect { .. }));
    }

    #[test]
    fn test_non_placeholder_braces_untouched() {
        let out = render_for(
            r#"{"symbol": "{segments[0]}"}"#,
            "prices/equity/AAPL",
            &["AAPL"],
            SourceType::Rest,
        )
        .unwrap();
        assert_eq!(out, r#"{"symbol": "AAPL"}"#);
    }

    #[test]
    fn test_moniker_placeholder() {
        let out = render_for("{moniker}", "prices/equity/AAPL@latest", &["AAPL"], SourceType::Rest)
            .unwrap();
        assert_eq!(out, "moniker://prices/equity/AAPL@latest");
    }
}
