use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Equality filter on a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column name to match on.
    pub column: String,
    /// Value the column must equal.
    pub value: JsonValue,
}

/// Explicit query specification for bulk fetches, filtered deletes, and
/// change-feed subscriptions.
///
/// Replaces ad hoc query-builder passthroughs with a statically checkable
/// value object: an optional equality filter and an optional projection list.
///
/// # Examples
///
/// ```rust
/// use table_mirror::QuerySpec;
/// use serde_json::json;
///
/// // Everything in the table
/// let all = QuerySpec::all();
///
/// // Rows where status = "active", only two columns
/// let spec = QuerySpec::filtered("status", json!("active"))
///     .with_projection(["id", "name"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Optional equality filter; `None` matches every row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,

    /// Optional projection column list; `None` selects all columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Vec<String>>,
}

impl QuerySpec {
    /// Specification matching every row in the table.
    pub fn all() -> Self {
        Self::default()
    }

    /// Specification matching rows where `column` equals `value`.
    pub fn filtered(column: impl Into<String>, value: JsonValue) -> Self {
        Self {
            filter: Some(Filter {
                column: column.into(),
                value,
            }),
            projection: None,
        }
    }

    /// Restrict the selected columns.
    pub fn with_projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Returns true when `row` satisfies the filter (vacuously true without one).
    pub fn matches(&self, row: &super::Row) -> bool {
        match &self.filter {
            Some(f) => row.get(&f.column) == Some(&f.value),
            None => true,
        }
    }
}
