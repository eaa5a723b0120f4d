//! Second pass over a parsed query that marks semantically malformed filters.
//!
//! Validation never removes or restructures tokens. It only sets
//! [`Filter::invalid`], whose reason is shown to the user as a hint.

use chrono::{FixedOffset, NaiveDate, NaiveTime};
use thiserror::Error;
use tracing::debug;

use crate::config::{KeyType, SearchConfig};
use crate::token::{Filter, FilterOperator, ParseResult, Token, TokenKind};

/// Why a filter is invalid. The `Display` text is the user-facing reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidReason {
    #[error("Invalid key. \"{0}\" is not a supported search key.")]
    UnsupportedKey(String),

    #[error("Filter must have a value.")]
    MissingValue,

    #[error("Invalid number. Expected number then optional k, m, or b suffix (e.g. 500k).")]
    InvalidNumber,

    #[error("Invalid duration. Expected number followed by duration unit suffix (e.g. 500ms).")]
    InvalidDuration,

    #[error("Invalid date format. Expected +/-duration (e.g. +1h) or ISO 8601-like (e.g. 2022-03-01).")]
    InvalidDateFormat,

    #[error("Invalid date. \"{0}\" is not a real calendar date or time.")]
    InvalidDate(String),

    #[error("Invalid boolean. Expected true, 1, false, or 0.")]
    InvalidBoolean,

    #[error("The \"{operator}\" operator cannot be used with {value} values.")]
    UnsupportedOperator {
        operator: FilterOperator,
        value: &'static str,
    },

    #[error("Quotes must enclose text or be escaped.")]
    UnbalancedQuotes,
}

const MULTIPLIER_UNITS: [&str; 3] = ["k", "m", "b"];
const DURATION_UNITS: [&str; 10] = ["ms", "s", "min", "m", "hr", "h", "day", "d", "wk", "w"];
const RELATIVE_DATE_UNITS: [&str; 4] = ["w", "d", "h", "m"];

/// Marks every filter in `result`, including filters nested in groups.
pub fn annotate<'a>(result: &mut ParseResult<'a>, config: &SearchConfig) {
    let mut pending: Vec<&mut Token<'a>> = result.tokens.iter_mut().collect();
    while let Some(token) = pending.pop() {
        let Token { kind, text, .. } = token;
        match kind {
            TokenKind::Filter(filter) => {
                filter.invalid = check_filter(filter, config);
                if let Some(reason) = &filter.invalid {
                    debug!(filter = *text, %reason, "invalid filter");
                }
            }
            TokenKind::LogicGroup(inner) => pending.extend(inner.tokens.iter_mut()),
            _ => {}
        }
    }
}

/// Returns the first rule `filter` breaks, if any.
pub fn check_filter(filter: &Filter<'_>, config: &SearchConfig) -> Option<InvalidReason> {
    let key = filter.key_name();
    if !filter.is_explicit_tag() && !config.is_key_allowed(key) {
        return Some(InvalidReason::UnsupportedKey(key.to_string()));
    }

    let value = &filter.value;
    if value.text.is_empty() {
        return Some(InvalidReason::MissingValue);
    }

    let typed_key = match filter.key.kind {
        TokenKind::KeySimple { .. } => config.key_type(key),
        _ => None,
    };
    if let Some(key_type) = typed_key {
        if let Some(reason) = check_typed_value(key_type, value) {
            return Some(reason);
        }
    }

    if matches!(value.kind, TokenKind::ValueIso8601Date) && !is_calendar_date(value.text) {
        return Some(InvalidReason::InvalidDate(value.text.to_string()));
    }

    if let Some(operator) = filter.operator {
        let value_label = match value.kind {
            TokenKind::ValueTextList(_) | TokenKind::ValueNumberList(_) => Some("list"),
            TokenKind::ValueText { .. } if operator.is_comparison() => Some("text"),
            TokenKind::ValueBoolean(_) if operator.is_comparison() => Some("boolean"),
            _ => None,
        };
        if let Some(value) = value_label {
            return Some(InvalidReason::UnsupportedOperator { operator, value });
        }
    }

    if let TokenKind::ValueText { quoted: false, .. } = value.kind {
        if value.text.contains('"') {
            return Some(InvalidReason::UnbalancedQuotes);
        }
    }

    None
}

fn check_typed_value(key_type: KeyType, value: &Token<'_>) -> Option<InvalidReason> {
    let ok = match key_type {
        KeyType::Numeric => match &value.kind {
            TokenKind::ValueNumber { unit, .. } => unit.map_or(true, |u| MULTIPLIER_UNITS.contains(&u)),
            TokenKind::ValueNumberList(items) => items.iter().all(|item| {
                matches!(item.value.kind, TokenKind::ValueNumber { unit, .. }
                    if unit.map_or(true, |u| MULTIPLIER_UNITS.contains(&u)))
            }),
            _ => false,
        },
        KeyType::Duration => matches!(value.kind, TokenKind::ValueNumber { unit: Some(unit), .. }
            if DURATION_UNITS.contains(&unit)),
        KeyType::Date => match value.kind {
            TokenKind::ValueIso8601Date => true,
            TokenKind::ValueNumber { value, unit } => is_relative_date(value, unit),
            _ => false,
        },
        KeyType::Boolean => match value.kind {
            TokenKind::ValueBoolean(_) => true,
            TokenKind::ValueNumber { value, unit: None } => value == "1" || value == "0",
            _ => false,
        },
    };
    if ok {
        return None;
    }
    Some(match key_type {
        KeyType::Numeric => InvalidReason::InvalidNumber,
        KeyType::Duration => InvalidReason::InvalidDuration,
        KeyType::Date => InvalidReason::InvalidDateFormat,
        KeyType::Boolean => InvalidReason::InvalidBoolean,
    })
}

/// `-24h`, `+1w`: a signed whole number with a week/day/hour/minute unit.
fn is_relative_date(value: &str, unit: Option<&str>) -> bool {
    let signed = value.starts_with('-') || value.starts_with('+');
    signed
        && !value.contains('.')
        && unit.is_some_and(|u| RELATIVE_DATE_UNITS.contains(&u))
}

/// Checks an ISO 8601 shaped value (see [`crate::parser::is_iso8601_date`])
/// names a real date, time and offset.
pub fn is_calendar_date(text: &str) -> bool {
    let field = |range: std::ops::Range<usize>| -> Option<u32> { text.get(range)?.parse().ok() };

    let date = field(0..4)
        .zip(field(5..7))
        .zip(field(8..10))
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y as i32, m, d));
    if date.is_none() {
        return false;
    }

    let Some(time) = text.get(10..).and_then(|t| t.strip_prefix('T')) else {
        return true;
    };

    let (clock, offset) = match time.find(['Z', '+', '-']) {
        Some(i) => time.split_at(i),
        None => (time, ""),
    };

    let mut parts = clock.split(':');
    let hour = parts.next().and_then(|p| p.parse::<u32>().ok());
    let minute = parts.next().and_then(|p| p.parse::<u32>().ok());
    let second = parts
        .next()
        .map(|p| p.split('.').next().unwrap_or(p).parse::<u32>().ok())
        .unwrap_or(Some(0));
    let valid_time = match (hour, minute, second) {
        (Some(h), Some(m), Some(s)) => NaiveTime::from_hms_opt(h, m, s).is_some(),
        _ => false,
    };
    if !valid_time {
        return false;
    }

    if offset.is_empty() || offset == "Z" {
        return true;
    }
    let sign = if offset.starts_with('-') { -1 } else { 1 };
    let digits: String = offset[1..].chars().filter(|c| *c != ':').collect();
    let hours = digits.get(0..2).and_then(|h| h.parse::<i32>().ok());
    let minutes = digits.get(2..4).and_then(|m| m.parse::<i32>().ok());
    match (hours, minutes) {
        (Some(h), Some(m)) if h < 24 && m < 60 => {
            FixedOffset::east_opt(sign * (h * 3600 + m * 60)).is_some()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_with_config};

    fn reason(query: &str) -> Option<InvalidReason> {
        let result = parse(query);
        let filters = result.filters();
        assert_eq!(filters.len(), 1, "{:?}", result);
        filters[0].invalid.clone()
    }

    #[test]
    fn test_untyped_keys_are_valid() {
        assert_eq!(reason("is:unresolved"), None);
        assert_eq!(reason("level:error"), None);
        assert_eq!(reason("release:1.0"), None);
        assert_eq!(reason("tags[times_seen]:abc"), None);
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(reason("is:"), Some(InvalidReason::MissingValue));
    }

    #[test]
    fn test_numeric_keys() {
        assert_eq!(reason("times_seen:10"), None);
        assert_eq!(reason("times_seen:>=500k"), None);
        assert_eq!(reason("times_seen:[1, 2]"), None);
        assert_eq!(reason("times_seen:lots"), Some(InvalidReason::InvalidNumber));
        assert_eq!(reason("times_seen:10ms"), Some(InvalidReason::InvalidNumber));
    }

    #[test]
    fn test_duration_keys() {
        assert_eq!(reason("transaction.duration:>300ms"), None);
        assert_eq!(
            reason("transaction.duration:300"),
            Some(InvalidReason::InvalidDuration)
        );
    }

    #[test]
    fn test_date_keys() {
        assert_eq!(reason("age:-24h"), None);
        assert_eq!(reason("age:+1w"), None);
        assert_eq!(reason("timestamp:>2021-01-01T10:00:00Z"), None);
        assert_eq!(reason("age:24h"), Some(InvalidReason::InvalidDateFormat));
        assert_eq!(reason("age:-1.5h"), Some(InvalidReason::InvalidDateFormat));
        assert_eq!(reason("age:yesterday"), Some(InvalidReason::InvalidDateFormat));
    }

    #[test]
    fn test_malformed_calendar_date() {
        assert_eq!(
            reason("timestamp:2021-13-45"),
            Some(InvalidReason::InvalidDate("2021-13-45".to_string()))
        );
        assert_eq!(
            reason("seen:2021-02-30"),
            Some(InvalidReason::InvalidDate("2021-02-30".to_string()))
        );
        assert!(is_calendar_date("2024-02-29"));
        assert!(is_calendar_date("2021-01-01T23:59:59.999+05:30"));
        assert!(is_calendar_date("2021-01-01T10:00-0800"));
        assert!(!is_calendar_date("2021-01-01T24:00"));
        assert!(!is_calendar_date("2021-01-01T10:00+25:00"));
    }

    #[test]
    fn test_boolean_keys() {
        assert_eq!(reason("error.handled:true"), None);
        assert_eq!(reason("error.handled:0"), None);
        assert_eq!(reason("error.handled:yes"), Some(InvalidReason::InvalidBoolean));
    }

    #[test]
    fn test_operator_value_mismatch() {
        assert_eq!(
            reason("level:>error"),
            Some(InvalidReason::UnsupportedOperator {
                operator: FilterOperator::Gt,
                value: "text"
            })
        );
        assert_eq!(
            reason("level:=[a,b]"),
            Some(InvalidReason::UnsupportedOperator {
                operator: FilterOperator::Eq,
                value: "list"
            })
        );
        assert_eq!(reason("level:!=error"), None);
        assert_eq!(reason("count:>5"), None);
    }

    #[test]
    fn test_unbalanced_quotes() {
        assert_eq!(reason("message:\"oops"), Some(InvalidReason::UnbalancedQuotes));
        assert_eq!(reason("message:\"fine\""), None);
    }

    #[test]
    fn test_allowed_keys() {
        let config = SearchConfig {
            allowed_keys: Some(["is".to_string()].into_iter().collect()),
            ..SearchConfig::default()
        };
        let result = parse_with_config("is:unresolved bad:1 tags[bad]:1", &config);
        let reasons: Vec<_> = result.filters().iter().map(|f| f.invalid.clone()).collect();
        assert_eq!(
            reasons,
            vec![
                None,
                Some(InvalidReason::UnsupportedKey("bad".to_string())),
                None
            ]
        );
    }

    #[test]
    fn test_nested_filters_are_annotated() {
        let result = parse("(a:1 OR (times_seen:many))");
        let filters = result.filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].invalid, None);
        assert_eq!(filters[1].invalid, Some(InvalidReason::InvalidNumber));
    }

    #[test]
    fn test_deeply_nested_filter_is_annotated() {
        let depth = 100_000;
        let query = "(".repeat(depth) + "times_seen:many" + &")".repeat(depth);
        let result = parse(&query);
        let filters = result.filters();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].invalid, Some(InvalidReason::InvalidNumber));
    }

    #[test]
    fn test_reason_text() {
        assert_eq!(
            InvalidReason::UnsupportedOperator {
                operator: FilterOperator::Lte,
                value: "boolean"
            }
            .to_string(),
            "The \"<=\" operator cannot be used with boolean values."
        );
        assert_eq!(
            InvalidReason::UnsupportedKey("bad".to_string()).to_string(),
            "Invalid key. \"bad\" is not a supported search key."
        );
    }
}
