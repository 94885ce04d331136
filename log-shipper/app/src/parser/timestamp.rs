//! Best-effort timestamp parsing.
//!
//! Every entry point returns epoch seconds and never fails: when no format
//! matches, the current UTC time is returned instead. Parsed date-times are
//! interpreted as UTC.

use super::regex_patterns::COMPACT_TIMESTAMP;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

/// Full date-time layouts with a 4-digit year. chrono's numeric specifiers
/// accept one or two digits, so `2025-1-21 13:26:7` matches the first entry.
const FULL_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Parses `raw` into epoch seconds, falling back to the current UTC time.
pub fn parse_timestamp(raw: &str) -> i64 {
    parse_timestamp_at(raw, Utc::now())
}

/// Same as [`parse_timestamp`] with an explicit clock, used for the year of
/// year-less values and as the fallback.
pub fn parse_timestamp_at(raw: &str, now: DateTime<Utc>) -> i64 {
    try_parse_timestamp(raw, now.year()).unwrap_or_else(|| now.timestamp())
}

/// Strict variant: `None` when no format matches.
pub fn try_parse_timestamp(raw: &str, current_year: i32) -> Option<i64> {
    let cleaned = raw
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim();
    if cleaned.is_empty() {
        return None;
    }

    parse_full(cleaned)
        .or_else(|| parse_compact(cleaned))
        .or_else(|| parse_yearless(cleaned, current_year))
}

fn parse_full(value: &str) -> Option<i64> {
    FULL_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc().timestamp())
    })
}

fn parse_compact(value: &str) -> Option<i64> {
    let regex = COMPACT_TIMESTAMP.regex().ok()?;
    let caps = regex.captures(value)?;
    let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)?
        .and_hms_opt(number(4)?, number(5)?, number(6)?)
        .map(|naive| naive.and_utc().timestamp())
}

/// `MM-DD-HH:MM:SS:fff` and friends: six numeric parts, the last one a
/// millisecond or sequence value that does not contribute to the timestamp.
fn parse_yearless(value: &str, current_year: i32) -> Option<i64> {
    if !(value.contains('-') && value.contains(':')) {
        return None;
    }

    let parts: Vec<&str> = value
        .split(['-', ':', ' '])
        .filter(|part| !part.is_empty())
        .collect();
    if parts.len() != 6 {
        return None;
    }

    let rebuilt = format!(
        "{current_year}-{}-{} {}:{}:{}",
        parts[0], parts[1], parts[2], parts[3], parts[4]
    );
    parse_full(&rebuilt)
}
