//! Report normalizer.
//!
//! Three independent test runners produce structurally different JSON
//! with no shared discriminator field, so the producing tool is
//! detected from the report's top-level key set, parsed into a
//! [`RunnerKind`] tag once, and dispatched on that tag for
//! normalization. Normalizing maps each runner's pass/fail/duration/
//! start-time fields onto a canonical `stats` shape and strips the
//! bulky originals so cached payloads stay small.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The originating test tool of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    Playwright,
    Pytest,
    Artillery,
    Unknown,
}

impl RunnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerKind::Playwright => "playwright",
            RunnerKind::Pytest => "pytest",
            RunnerKind::Artillery => "artillery",
            RunnerKind::Unknown => "unknown",
        }
    }
}

/// Canonical stats shape every cached report carries under `stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalStats {
    pub runner: RunnerKind,
    /// ISO-8601 start time. Client sort order depends on this field
    /// being present, so a missing value is substituted with the
    /// current wall clock.
    #[serde(rename = "startTime")]
    pub start_time: String,
    pub expected: i64,
    pub unexpected: i64,
    pub skipped: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Heavy top-level fields removed from every normalized report.
const STRIPPED_FIELDS: [&str; 6] = [
    "config",
    "suites",
    "collectors",
    "tests",
    "intermediate",
    "summary",
];

/// Detect the producing runner from the report's top-level key set.
pub fn identify_runner(report: &Value) -> RunnerKind {
    let Some(keys) = report.as_object() else {
        return RunnerKind::Unknown;
    };
    if keys.contains_key("config") && keys.contains_key("suites") {
        RunnerKind::Playwright
    } else if keys.contains_key("collectors") && keys.contains_key("tests") {
        RunnerKind::Pytest
    } else if keys.contains_key("aggregate") && keys.contains_key("intermediate") {
        RunnerKind::Artillery
    } else {
        RunnerKind::Unknown
    }
}

/// Normalize a raw runner report in place.
///
/// Extracts canonical stats for the detected runner, deletes the heavy
/// originals, and writes the canonical object back under `stats`.
/// Unrecognized shapes degrade to the `unknown` runner with default
/// stats rather than failing.
pub fn normalize(report: &mut Value) -> CanonicalStats {
    let runner = identify_runner(report);
    let stats = match runner {
        RunnerKind::Playwright => playwright_stats(report),
        RunnerKind::Pytest => pytest_stats(report),
        RunnerKind::Artillery => artillery_stats(report),
        RunnerKind::Unknown => CanonicalStats {
            runner,
            start_time: substitute_start_time(runner),
            expected: 0,
            unexpected: 0,
            skipped: 0,
            duration: None,
        },
    };

    if let Some(obj) = report.as_object_mut() {
        for field in STRIPPED_FIELDS {
            obj.remove(field);
        }
        if let Some(aggregate) = obj.get_mut("aggregate").and_then(Value::as_object_mut) {
            aggregate.remove("histograms");
            aggregate.remove("summaries");
        }
        obj.insert("stats".to_string(), stats_value(&stats));
    }

    stats
}

fn stats_value(stats: &CanonicalStats) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("runner".to_string(), Value::from(stats.runner.as_str()));
    obj.insert("startTime".to_string(), Value::from(stats.start_time.as_str()));
    obj.insert("expected".to_string(), Value::from(stats.expected));
    obj.insert("unexpected".to_string(), Value::from(stats.unexpected));
    obj.insert("skipped".to_string(), Value::from(stats.skipped));
    if let Some(duration) = stats.duration {
        obj.insert("duration".to_string(), Value::from(duration));
    }
    Value::Object(obj)
}

fn playwright_stats(report: &Value) -> CanonicalStats {
    let stats = report.get("stats");
    let start_time = stats
        .and_then(|s| s.get("startTime"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| substitute_start_time(RunnerKind::Playwright));
    CanonicalStats {
        runner: RunnerKind::Playwright,
        start_time,
        expected: int_field(stats, "expected"),
        unexpected: int_field(stats, "unexpected"),
        skipped: int_field(stats, "skipped"),
        duration: stats.and_then(|s| s.get("duration")).and_then(Value::as_f64),
    }
}

fn pytest_stats(report: &Value) -> CanonicalStats {
    let summary = report.get("summary");
    let start_time = report
        .get("created")
        .and_then(Value::as_f64)
        .and_then(|epoch| DateTime::from_timestamp_millis((epoch * 1000.0) as i64))
        .map(format_iso)
        .unwrap_or_else(|| substitute_start_time(RunnerKind::Pytest));
    CanonicalStats {
        runner: RunnerKind::Pytest,
        start_time,
        expected: int_field(summary, "passed"),
        unexpected: int_field(summary, "failed"),
        skipped: int_field(summary, "skipped"),
        duration: report.get("duration").and_then(Value::as_f64),
    }
}

fn artillery_stats(report: &Value) -> CanonicalStats {
    let aggregate = report.get("aggregate");
    let counters = aggregate.and_then(|a| a.get("counters"));
    let first_metric_at = aggregate
        .and_then(|a| a.get("firstMetricAt"))
        .and_then(Value::as_i64);
    let last_metric_at = aggregate
        .and_then(|a| a.get("lastMetricAt"))
        .and_then(Value::as_i64);
    let start_time = first_metric_at
        .and_then(DateTime::from_timestamp_millis)
        .map(format_iso)
        .unwrap_or_else(|| substitute_start_time(RunnerKind::Artillery));
    let duration = match (first_metric_at, last_metric_at) {
        (Some(first), Some(last)) if last >= first => Some((last - first) as f64 / 1000.0),
        _ => None,
    };
    CanonicalStats {
        runner: RunnerKind::Artillery,
        start_time,
        expected: int_field(counters, "vusers.completed"),
        unexpected: int_field(counters, "vusers.failed"),
        skipped: 0,
        duration,
    }
}

fn int_field(value: Option<&Value>, field: &str) -> i64 {
    value
        .and_then(|v| v.get(field))
        .and_then(Value::as_i64)
        .unwrap_or(0)
}

fn format_iso(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn substitute_start_time(runner: RunnerKind) -> String {
    let now = format_iso(Utc::now());
    tracing::warn!(
        runner = runner.as_str(),
        substituted = %now,
        "report carried no derivable start time; substituting wall clock"
    );
    now
}
