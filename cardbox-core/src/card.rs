//! Card model: one test run's metadata plus its normalized report.

use serde::{Deserialize, Serialize};

/// File type of the object a card was built from.
///
/// Only JSON reports feed the cache; HTML artifacts are addressed by
/// the sibling `index.html` convention instead of being scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFileType {
    Json,
}

/// Structured metadata parsed from an object-store key.
///
/// Produced by the remote scanner, matched by the filter engine, and
/// stored alongside the normalized report inside each cached card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMetadata {
    /// Product/application the run belongs to.
    pub app: String,
    /// Test environment (qa, dev, uat, ...).
    pub environment: String,
    /// Test protocol (api, ui, perf, ...).
    pub protocol: String,
    /// Card date: the producing job's output directory name.
    /// Unique per physical test run by construction; never re-derived.
    pub day: String,
    /// Full object key of the JSON report.
    pub object_name: String,
    /// Key prefix of the whole report folder (html + json + assets).
    pub root_dir: String,
    /// Always JSON for scanned reports.
    pub file_type: ReportFileType,
}

/// One test run's cached artifact bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    /// Metadata the filter engine matches against.
    pub filter_metadata: FilterMetadata,
    /// Relative path of the HTML artifact for viewers
    /// (`{card_date}/index.html`).
    pub html_report: String,
    /// Normalized report: a `stats` object in the canonical shape plus
    /// whatever lightweight residue the producing runner left behind.
    /// Heavy fields are stripped before the card is cached.
    pub report: serde_json::Value,
    /// Object-store prefix of the full report folder.
    pub root_dir: String,
}

impl Card {
    /// Card date identifying this run (same value as `filter_metadata.day`).
    pub fn card_date(&self) -> &str {
        &self.filter_metadata.day
    }

    /// The `stats.startTime` value clients sort on, if present.
    pub fn start_time(&self) -> Option<&str> {
        self.report.get("stats")?.get("startTime")?.as_str()
    }
}
