use super::row::Row;

/// Row-level change delivered by the feed to a mirror.
///
/// This is the store-agnostic shape: wire parsing (see
/// [`FeedMessage`](super::FeedMessage)) happens in the transport, and an
/// in-process store can emit these directly.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    /// A new row appeared in the subscribed table.
    Insert {
        /// The inserted row (current values).
        row: Row,
    },

    /// An existing row changed.
    Update {
        /// The updated row (current values).
        row: Row,
    },

    /// A row was removed.
    Delete {
        /// Identifier of the removed row.
        id: String,
    },
}

impl ChangeEvent {
    /// Returns the identifier the event applies to, if it carries one.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Insert { row } | Self::Update { row } => super::row_id(row),
            Self::Delete { id } => Some(id.as_str()),
        }
    }
}
