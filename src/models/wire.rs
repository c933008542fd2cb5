use serde::{Deserialize, Serialize};

use super::query_spec::QuerySpec;
use super::row::Row;

/// Kind of row-level change carried on the feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// New row inserted
    Insert,

    /// Existing row updated
    Update,

    /// Row deleted
    Delete,
}

/// Reference to a row by identifier only, used in delete notifications where
/// the server sends just the old key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowRef {
    /// Identifier of the affected row.
    pub id: String,
}

/// Messages sent from the client over the feed socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedRequest {
    /// Authenticate the connection before subscribing.
    Authenticate {
        /// Bearer token or service key.
        token: String,
    },

    /// Register a subscription for one table, optionally filtered.
    Subscribe {
        /// Client-generated subscription identifier.
        subscription_id: String,
        /// Table to watch.
        table: String,
        /// Row filter; matches everything when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<QuerySpec>,
    },

    /// Remove a previously registered subscription.
    Unsubscribe {
        /// The subscription to remove.
        subscription_id: String,
    },
}

/// Messages received from the server over the feed socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedMessage {
    /// Authentication accepted.
    AuthSuccess {
        /// Authenticated user ID, when known.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    /// Authentication rejected.
    AuthError {
        /// Error message
        message: String,
    },

    /// Subscription registered; change notifications follow.
    Subscribed {
        /// The subscription ID that was registered.
        subscription_id: String,
    },

    /// Row-level change notification.
    Change {
        /// The subscription ID this notification is for.
        subscription_id: String,

        /// Kind of change: "insert", "update", or "delete".
        operation: Operation,

        /// New/current row values (insert and update).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new: Option<Row>,

        /// Old row key (delete).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old: Option<RowRef>,
    },

    /// Server-side error scoped to one subscription.
    Error {
        /// The subscription ID the error relates to, when scoped.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subscription_id: Option<String>,
        /// Error message
        message: String,
    },
}
