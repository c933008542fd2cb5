//! # table-mirror
//!
//! Client-side mirror of a remote table, kept current through a live change
//! feed. Rows are fetched in bulk over HTTP, held in an in-memory keyed map,
//! and patched row by row as insert/update/delete notifications arrive over
//! a WebSocket feed. Every applied change republishes a full snapshot to a
//! registered callback, so consumers re-render from a complete array instead
//! of diffing.
//!
//! ## Architecture
//!
//! ```text
//! consumer callback (full snapshots)
//!     ↑
//! TableMirror (keyed map + change application)
//!     ↓
//! TableStore (trait: fetch / mutate / subscribe)
//!     ↓
//! MirrorClient (HTTP rows + WebSocket feed)   or   MemoryStore (in-process)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use table_mirror::MirrorClient;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = MirrorClient::builder()
//!     .base_url("http://localhost:3000")
//!     .build()?;
//!
//! let mirror = client.mirror("notes");
//! mirror
//!     .initialize(|rows| println!("{} note(s)", rows.len()), None)
//!     .await?;
//!
//! // Mutations go to the server; the feed echo updates the mirror.
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod event_handlers;
pub mod feed;
pub mod memory;
pub mod mirror;
pub mod models;
pub mod normalize;
mod query;
pub mod store;
pub mod timeouts;
pub mod toast;

pub use auth::AuthProvider;
pub use client::{AuthStateSubscription, HealthStatus, MirrorClient, MirrorClientBuilder};
pub use error::{MirrorError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use memory::MemoryStore;
pub use mirror::{OnChange, TableMirror};
pub use models::{
    row_id, ChangeEvent, FeedMessage, FeedRequest, Filter, LoginRequest, Operation, QuerySpec,
    Row, RowRef, Session, UserInfo,
};
pub use normalize::{normalize_row, parse_iso8601};
pub use store::{ChangeFeed, TableStore, DEFAULT_FEED_CHANNEL_CAPACITY};
pub use timeouts::{MirrorTimeouts, MirrorTimeoutsBuilder};
pub use toast::{Toast, ToastSink, DEFAULT_DISMISS_AFTER};
