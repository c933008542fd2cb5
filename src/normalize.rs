//! Timestamp normalization for inbound rows.
//!
//! Rows arrive from the store as plain JSON, with timestamp columns encoded as
//! ISO-8601 strings. The mirror stores timestamps as integer milliseconds
//! since the Unix epoch so snapshots compare and sort without re-parsing.
//! Columns whose name ends in `_at` are treated as timestamp-shaped; anything
//! that is not a parseable string passes through unchanged.

use chrono::DateTime;
use serde_json::Value as JsonValue;

use crate::models::Row;

/// Returns true for column names treated as timestamp-shaped.
fn is_timestamp_column(name: &str) -> bool {
    name.ends_with("_at")
}

/// Parse an ISO-8601 / RFC 3339 timestamp string into epoch milliseconds.
pub fn parse_iso8601(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.timestamp_millis())
        .ok()
}

/// Normalize timestamp-shaped fields of a row in place.
///
/// A string value in a `*_at` column that parses as ISO-8601 is replaced with
/// its epoch-millisecond integer. Unparseable strings, non-string values, and
/// absent columns are left untouched.
pub fn normalize_row(row: &mut Row) {
    for (name, value) in row.iter_mut() {
        if !is_timestamp_column(name) {
            continue;
        }
        if let JsonValue::String(s) = value {
            if let Some(ms) = parse_iso8601(s) {
                *value = JsonValue::from(ms);
            }
        }
    }
}
