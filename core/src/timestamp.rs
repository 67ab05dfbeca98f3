//! Execution-timestamp parsing against an ordered list of formats.
//!
//! The operations export writes `dd/mm/yyyy hh:mm`; files that have been
//! round-tripped through other tools come back as ISO text. Formats are
//! tried in configuration order and the first match wins, so the native
//! export format always takes priority.

use chrono::{NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampParse {
    Parsed(NaiveDateTime),
    Missing,
    Unparseable,
}

impl TimestampParse {
    pub fn value(self) -> Option<NaiveDateTime> {
        match self {
            TimestampParse::Parsed(ts) => Some(ts),
            _ => None,
        }
    }
}

const EMPTY_TOKENS: &[&str] = &["", "nan", "NaN", "NaT", "None"];

pub fn parse_timestamp(raw: Option<&str>, formats: &[String]) -> TimestampParse {
    let Some(raw) = raw.map(str::trim) else {
        return TimestampParse::Missing;
    };
    if EMPTY_TOKENS.contains(&raw) {
        return TimestampParse::Missing;
    }

    for format in formats {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return TimestampParse::Parsed(ts);
        }
        // Date-only formats never satisfy NaiveDateTime; fall back to midnight.
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            if let Some(ts) = date.and_hms_opt(0, 0, 0) {
                return TimestampParse::Parsed(ts);
            }
        }
    }
    TimestampParse::Unparseable
}

/// Canonical text form used for persistence. Sorts lexically in time order.
pub fn format_canonical(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn parse_canonical(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok()
}
