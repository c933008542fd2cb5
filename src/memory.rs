//! In-process [`TableStore`] with a change-feed echo.
//!
//! Behaves like the hosted service from the mirror's point of view: mutations
//! land in shared tables, ids and `created_at` are assigned server-side, and
//! every mutation is echoed to all matching live feeds. Useful as a test
//! double and for offline fixtures; it holds no durable state.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, oneshot};

use crate::error::{MirrorError, Result};
use crate::models::{row_id, ChangeEvent, QuerySpec, Row};
use crate::store::{ChangeFeed, TableStore, DEFAULT_FEED_CHANNEL_CAPACITY};

struct FeedEntry {
    id: u64,
    table: String,
    query: QuerySpec,
    tx: mpsc::Sender<Result<ChangeEvent>>,
}

#[derive(Default)]
struct MemoryInner {
    tables: RwLock<HashMap<String, HashMap<String, Row>>>,
    feeds: RwLock<Vec<FeedEntry>>,
    next_row_id: AtomicU64,
    next_feed_id: AtomicU64,
    fetch_count: AtomicUsize,
}

/// Shared in-memory table store. Cloning yields handles to the same tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bulk fetches served so far. Lets tests verify that a
    /// re-initialization actually hit the store again.
    pub fn fetch_count(&self) -> usize {
        self.inner.fetch_count.load(Ordering::SeqCst)
    }

    /// Number of currently registered change feeds.
    pub fn feed_count(&self) -> usize {
        self.inner.feeds.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Seed a row directly, bypassing id assignment. Panics on a row without
    /// an `id`; intended for test fixtures only.
    pub fn seed(&self, table: &str, row: Row) {
        let id = row_id(&row).expect("seeded row must carry an id").to_string();
        let mut tables = self
            .inner
            .tables
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tables.entry(table.to_string()).or_default().insert(id, row);
    }

    fn assign_server_fields(&self, row: &mut Row) -> String {
        let n = self.inner.next_row_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("row-{}", n);
        row.insert("id".to_string(), JsonValue::from(id.clone()));
        row.insert(
            "created_at".to_string(),
            JsonValue::from(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        id
    }

    /// Snapshot the senders interested in `table`, filtering deletes by id
    /// only (the row is gone, so the query filter cannot be consulted).
    fn matching_senders(
        &self,
        table: &str,
        row: Option<&Row>,
    ) -> Vec<mpsc::Sender<Result<ChangeEvent>>> {
        let feeds = self.inner.feeds.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        feeds
            .iter()
            .filter(|f| f.table == table)
            .filter(|f| row.map(|r| f.query.matches(r)).unwrap_or(true))
            .map(|f| f.tx.clone())
            .collect()
    }

    async fn echo(&self, table: &str, event: ChangeEvent, row: Option<&Row>) {
        for tx in self.matching_senders(table, row) {
            // A closed receiver just means that feed went away.
            let _ = tx.send(Ok(event.clone())).await;
        }
    }

    fn remove_feed(&self, feed_id: u64) {
        let mut feeds = self.inner.feeds.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        feeds.retain(|f| f.id != feed_id);
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn fetch_rows(&self, table: &str, query: &QuerySpec) -> Result<Vec<Row>> {
        self.inner.fetch_count.fetch_add(1, Ordering::SeqCst);
        let tables = self
            .inner
            .tables
            .read()
            .map_err(|e| MirrorError::InternalError(e.to_string()))?;
        let rows = match tables.get(table) {
            Some(t) => t.values().filter(|r| query.matches(r)).cloned().collect(),
            None => Vec::new(),
        };
        Ok(rows)
    }

    async fn insert_row(&self, table: &str, mut row: Row) -> Result<Row> {
        let id = self.assign_server_fields(&mut row);
        {
            let mut tables = self
                .inner
                .tables
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            tables
                .entry(table.to_string())
                .or_default()
                .insert(id, row.clone());
        }
        self.echo(table, ChangeEvent::Insert { row: row.clone() }, Some(&row))
            .await;
        Ok(row)
    }

    async fn update_row(&self, table: &str, id: &str, partial: Row) -> Result<()> {
        let updated = {
            let mut tables = self
                .inner
                .tables
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            let row = tables
                .get_mut(table)
                .and_then(|t| t.get_mut(id))
                .ok_or_else(|| MirrorError::ServerError {
                    status_code: 404,
                    message: format!("no row '{}' in table '{}'", id, table),
                })?;
            for (k, v) in partial {
                row.insert(k, v);
            }
            row.clone()
        };
        self.echo(table, ChangeEvent::Update { row: updated.clone() }, Some(&updated))
            .await;
        Ok(())
    }

    async fn upsert_row(&self, table: &str, mut row: Row) -> Result<Row> {
        let existed = {
            let mut tables = self
                .inner
                .tables
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            let id = match row_id(&row) {
                Some(id) => id.to_string(),
                None => self.assign_server_fields(&mut row),
            };
            tables
                .entry(table.to_string())
                .or_default()
                .insert(id, row.clone())
                .is_some()
        };
        let event = if existed {
            ChangeEvent::Update { row: row.clone() }
        } else {
            ChangeEvent::Insert { row: row.clone() }
        };
        self.echo(table, event, Some(&row)).await;
        Ok(row)
    }

    async fn delete_row(&self, table: &str, id: &str) -> Result<()> {
        let removed = {
            let mut tables = self
                .inner
                .tables
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            tables.get_mut(table).and_then(|t| t.remove(id))
        };
        if removed.is_some() {
            self.echo(table, ChangeEvent::Delete { id: id.to_string() }, None)
                .await;
        }
        Ok(())
    }

    async fn delete_rows(&self, table: &str, query: &QuerySpec) -> Result<()> {
        let removed_ids: Vec<String> = {
            let mut tables = self
                .inner
                .tables
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            match tables.get_mut(table) {
                Some(t) => {
                    let ids: Vec<String> = t
                        .iter()
                        .filter(|(_, r)| query.matches(r))
                        .map(|(id, _)| id.clone())
                        .collect();
                    for id in &ids {
                        t.remove(id);
                    }
                    ids
                }
                None => Vec::new(),
            }
        };
        for id in removed_ids {
            self.echo(table, ChangeEvent::Delete { id }, None).await;
        }
        Ok(())
    }

    async fn subscribe(&self, table: &str, query: &QuerySpec) -> Result<ChangeFeed> {
        let (tx, rx) = mpsc::channel(DEFAULT_FEED_CHANNEL_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();
        let feed_id = self.inner.next_feed_id.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut feeds = self
                .inner
                .feeds
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            feeds.push(FeedEntry {
                id: feed_id,
                table: table.to_string(),
                query: query.clone(),
                tx,
            });
        }

        // Unregister the feed when the consumer closes or drops the handle.
        let store = self.clone();
        tokio::spawn(async move {
            let _ = close_rx.await;
            store.remove_feed(feed_id);
        });

        Ok(ChangeFeed::new(rx, close_tx))
    }
}
