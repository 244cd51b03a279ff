//! Cardbox Core - Card Types and Pure Logic
//!
//! Data types and CPU-only transforms shared by every other crate:
//! the card model, the filter/validation engine, report-runner
//! detection and normalization, and the object-key path template.
//! No I/O and no async in this crate.

pub mod card;
pub mod date;
pub mod error;
pub mod filter;
pub mod path;
pub mod report;

pub use card::{Card, FilterMetadata, ReportFileType};
pub use date::{parse_card_date, within_age_days};
pub use error::{FilterMismatch, ParseError};
pub use filter::{validate, FetchSource, FilterQuery, MatchField};
pub use path::{parse_report_key, REPORT_FILENAME};
pub use report::{identify_runner, normalize, CanonicalStats, RunnerKind};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
