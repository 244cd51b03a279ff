//! Filter/validation engine.
//!
//! Equality-with-wildcard matching used by both the remote scanner
//! (filtering object-store results) and the cache read path (filtering
//! cached entries by query). The literal value `"all"` in a query
//! matches any received value for that field.

use serde::{Deserialize, Serialize};

use crate::card::FilterMetadata;
use crate::date::within_age_days;
use crate::error::FilterMismatch;

/// Wildcard sentinel accepted for app/environment/protocol.
pub const WILDCARD: &str = "all";

/// An expected value for a string-typed filter field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchField {
    /// The literal `"all"`: matches any received value.
    Any,
    /// Matches only the exact value.
    Exact(String),
}

impl MatchField {
    pub fn matches(&self, received: &str) -> bool {
        match self {
            MatchField::Any => true,
            MatchField::Exact(expected) => expected == received,
        }
    }

    /// The value as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            MatchField::Any => WILDCARD,
            MatchField::Exact(expected) => expected,
        }
    }
}

impl From<String> for MatchField {
    fn from(value: String) -> Self {
        if value == WILDCARD {
            MatchField::Any
        } else {
            MatchField::Exact(value)
        }
    }
}

impl From<&str> for MatchField {
    fn from(value: &str) -> Self {
        MatchField::from(value.to_string())
    }
}

impl From<MatchField> for String {
    fn from(value: MatchField) -> Self {
        value.as_str().to_string()
    }
}

/// Where a query fetches cards from.
///
/// This key selects *how* to fetch, never *what* to keep: it is
/// excluded from matching by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchSource {
    Remote,
    Local,
}

/// A viewer's card query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterQuery {
    pub app: MatchField,
    pub environment: MatchField,
    pub protocol: MatchField,
    /// Maximum card age in days.
    pub day: u32,
    /// Fetch mode; never matched against card data.
    pub source: FetchSource,
}

impl FilterQuery {
    /// A query matching everything from the last `day` days.
    pub fn any(day: u32, source: FetchSource) -> Self {
        Self {
            app: MatchField::Any,
            environment: MatchField::Any,
            protocol: MatchField::Any,
            day,
            source,
        }
    }
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            app: MatchField::Any,
            environment: MatchField::Exact("qa".to_string()),
            protocol: MatchField::Any,
            day: 1,
            source: FetchSource::Remote,
        }
    }
}

/// Validate received card metadata against a query.
///
/// Returns the first mismatch, or `None` when every checked field
/// passes. String fields pass on equality or wildcard; `day` passes
/// when the card date is within the query's age window.
pub fn validate(received: &FilterMetadata, expected: &FilterQuery) -> Option<FilterMismatch> {
    let string_fields = [
        ("environment", &expected.environment, &received.environment),
        ("app", &expected.app, &received.app),
        ("protocol", &expected.protocol, &received.protocol),
    ];

    for (field, expected_value, received_value) in string_fields {
        if !expected_value.matches(received_value) {
            return Some(FilterMismatch {
                field,
                expected: expected_value.as_str().to_string(),
                received: received_value.clone(),
            });
        }
    }

    if !within_age_days(&received.day, expected.day) {
        return Some(FilterMismatch {
            field: "day",
            expected: expected.day.to_string(),
            received: received.day.clone(),
        });
    }

    None
}
