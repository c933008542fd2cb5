use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// A single remote record: a flat key-value row with an opaque `id` and, by
/// convention, a `created_at` timestamp. Concrete shapes vary per table.
pub type Row = HashMap<String, JsonValue>;

/// Extract the opaque identifier from a row, if present and a string.
pub fn row_id(row: &Row) -> Option<&str> {
    row.get("id").and_then(JsonValue::as_str)
}
