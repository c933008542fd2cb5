//! The remote-store contract consumed by [`TableMirror`](crate::TableMirror).
//!
//! The store is deliberately a trait object seam: the production
//! implementation is [`MirrorClient`](crate::MirrorClient) (HTTP + WebSocket),
//! and tests plug in [`MemoryStore`](crate::MemoryStore) without any network.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::models::{ChangeEvent, QuerySpec, Row};

/// Default capacity for the event channel between a feed producer and the
/// mirror's apply task. When full, the producer applies back-pressure.
pub const DEFAULT_FEED_CHANNEL_CAPACITY: usize = 1024;

/// One remote table provider: bulk query, row mutations, and a change feed.
///
/// All mutation methods write remotely only; observing the effect locally is
/// the change feed's job.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Fetch all rows of `table` matching `query`.
    async fn fetch_rows(&self, table: &str, query: &QuerySpec) -> Result<Vec<Row>>;

    /// Insert a row; the store assigns `id` and `created_at`. Returns the
    /// stored row as the server recorded it.
    async fn insert_row(&self, table: &str, row: Row) -> Result<Row>;

    /// Apply a partial update to the row with identifier `id`.
    async fn update_row(&self, table: &str, id: &str, partial: Row) -> Result<()>;

    /// Insert or replace a row keyed by its `id` field; a row without an id
    /// behaves like an insert. Returns the stored row.
    async fn upsert_row(&self, table: &str, row: Row) -> Result<Row>;

    /// Delete the row with identifier `id`.
    async fn delete_row(&self, table: &str, id: &str) -> Result<()>;

    /// Delete every row matching `query`.
    async fn delete_rows(&self, table: &str, query: &QuerySpec) -> Result<()>;

    /// Open a change feed for `table`, delivering row-level events for rows
    /// matching `query` until the feed is closed.
    async fn subscribe(&self, table: &str, query: &QuerySpec) -> Result<ChangeFeed>;
}

/// Handle to one live change-feed subscription.
///
/// Events are produced by a background task (a WebSocket reader for the HTTP
/// client, an in-process fan-out for [`MemoryStore`](crate::MemoryStore)) and
/// consumed through a bounded channel. Dropping the handle signals the
/// producer to shut down.
pub struct ChangeFeed {
    events: mpsc::Receiver<Result<ChangeEvent>>,
    /// Signal the producer to initiate graceful shutdown.
    /// `None` after `close()` has been called (or consumed by `Drop`).
    close_tx: Option<oneshot::Sender<()>>,
    closed: bool,
}

impl ChangeFeed {
    /// Assemble a feed from its channel halves. Used by store implementations.
    pub fn new(
        events: mpsc::Receiver<Result<ChangeEvent>>,
        close_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            events,
            close_tx: Some(close_tx),
            closed: false,
        }
    }

    /// Receive the next change event.
    ///
    /// Returns `None` once the feed has ended (closed locally or the producer
    /// went away).
    pub async fn next(&mut self) -> Option<Result<ChangeEvent>> {
        if self.closed {
            return None;
        }
        match self.events.recv().await {
            Some(event) => Some(event),
            None => {
                self.closed = true;
                None
            }
        }
    }

    /// True while the producer side of the feed is still attached.
    pub fn is_active(&self) -> bool {
        !self.closed && self.close_tx.is_some()
    }

    /// Close the feed gracefully. Safe to call multiple times.
    pub fn close(&mut self) {
        self.closed = true;
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        // Producer also notices the receiver going away, this just makes the
        // shutdown prompt instead of lazy.
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed_pair() -> (mpsc::Sender<Result<ChangeEvent>>, oneshot::Receiver<()>, ChangeFeed) {
        let (tx, rx) = mpsc::channel(4);
        let (close_tx, close_rx) = oneshot::channel();
        (tx, close_rx, ChangeFeed::new(rx, close_tx))
    }

    #[tokio::test]
    async fn test_feed_delivers_events_then_ends() {
        let (tx, _close_rx, mut feed) = feed_pair();
        let mut row = Row::new();
        row.insert("id".to_string(), json!("1"));
        tx.send(Ok(ChangeEvent::Insert { row })).await.unwrap();
        drop(tx);

        match feed.next().await {
            Some(Ok(ChangeEvent::Insert { row })) => assert_eq!(row["id"], json!("1")),
            other => panic!("unexpected: {:?}", other.map(|r| r.map(|e| e.id().map(str::to_owned)))),
        }
        assert!(feed.next().await.is_none());
        assert!(!feed.is_active());
    }

    #[tokio::test]
    async fn test_close_signals_producer_and_is_idempotent() {
        let (_tx, close_rx, mut feed) = feed_pair();
        assert!(feed.is_active());
        feed.close();
        feed.close();
        assert!(!feed.is_active());
        close_rx.await.expect("producer should receive the close signal");
        assert!(feed.next().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_sends_close_signal() {
        let (_tx, close_rx, feed) = feed_pair();
        drop(feed);
        close_rx.await.expect("drop should send the close signal");
    }
}
