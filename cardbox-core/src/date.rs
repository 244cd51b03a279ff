//! Card-date parsing.
//!
//! Card dates are directory names formatted by the producing CI job.
//! Three naming generations exist in the store, so parsing tries each
//! format in order, newest first.

use chrono::{NaiveDateTime, Utc};

use crate::error::ParseError;

/// Known card-date formats, newest first.
const CARD_DATE_FORMATS: [&str; 3] = [
    "%m-%d-%Y_%I-%M-%S-%f_%p", // current, with sub-seconds: 02-18-2026_03-45-30-123456_PM
    "%m-%d-%Y_%I-%M-%S_%p",    // previous: 02-18-2026_03-45-30_PM
    "%Y-%m-%d-%H-%M-%S",       // legacy: 2024-12-31-1-40-53
];

/// Parse a card date string using any of the known formats.
pub fn parse_card_date(value: &str) -> Result<NaiveDateTime, ParseError> {
    for fmt in CARD_DATE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(ParseError::UnknownDateFormat {
        value: value.to_string(),
    })
}

/// Whether a card date falls within `max_age_days` of now.
///
/// Unparseable dates are treated as out of range rather than erroring,
/// so a stray directory name silently drops out of query results.
pub fn within_age_days(card_date: &str, max_age_days: u32) -> bool {
    let Ok(parsed) = parse_card_date(card_date) else {
        return false;
    };
    let age = Utc::now().naive_utc() - parsed;
    age <= chrono::Duration::days(i64::from(max_age_days))
}
