//! Object-key path template.
//!
//! Report objects live under the convention
//! `{prefix}/{app}/{environment}/{protocol}/{day}/report.json` with a
//! prefix of at least one segment. Segments are anchored against the
//! template by name from the end of the key, replacing the old
//! index-from-the-start extraction. Any convention change in the
//! producing jobs is a breaking change for this parser.
//!
//! Keys that do not fit the template parse to a [`ParseError`] the
//! caller is expected to skip on, so schema drift drops objects
//! instead of aborting a scan.

use crate::card::{FilterMetadata, ReportFileType};
use crate::error::ParseError;

/// Canonical report filename produced by every runner wrapper.
pub const REPORT_FILENAME: &str = "report.json";

/// Number of context segments required before the filename.
const MIN_CONTEXT_SEGMENTS: usize = 5;

/// Parse an object key into card filter metadata.
///
/// Keys with a different filename fail with [`ParseError::WrongFilename`];
/// keys with fewer than five context segments before it fail with
/// [`ParseError::PathTooShallow`].
pub fn parse_report_key(key: &str) -> Result<FilterMetadata, ParseError> {
    let mut segments: Vec<&str> = key.split('/').collect();
    if segments.pop() != Some(REPORT_FILENAME) {
        return Err(ParseError::WrongFilename {
            key: key.to_string(),
        });
    }
    if segments.len() < MIN_CONTEXT_SEGMENTS {
        return Err(ParseError::PathTooShallow {
            key: key.to_string(),
        });
    }

    // Template fields are anchored from the end: .../{app}/{environment}/{protocol}/{day}.
    let day = segments[segments.len() - 1];
    let protocol = segments[segments.len() - 2];
    let environment = segments[segments.len() - 3];
    let app = segments[segments.len() - 4];

    Ok(FilterMetadata {
        app: app.to_string(),
        environment: environment.to_string(),
        protocol: protocol.to_string(),
        day: day.to_string(),
        object_name: key.to_string(),
        root_dir: segments.join("/"),
        file_type: ReportFileType::Json,
    })
}
