//! The Remote Table Mirror: a synchronized local view of one remote table.
//!
//! A [`TableMirror`] performs one bulk fetch to populate an in-memory keyed
//! map, then keeps it current by applying the store's change feed. UI code
//! reads the mirror through a snapshot callback and full-snapshot
//! [`to_array`](TableMirror::to_array) reads; all mutations are remote
//! passthroughs.
//!
//! The mirror is never authoritative: the remote store is the sole source of
//! truth, and the mirror can be torn down and rebuilt at any time.
//!
//! # Mutation discipline
//!
//! Mutation methods (`insert`, `update`, `delete`, `delete_all`) write to the
//! remote store only and **never** touch the local map. The map changes
//! exclusively through change-feed events, including the echo of this
//! client's own writes. Between a successful remote write and the arrival of
//! its echo there is a brief window where `to_array` does not yet reflect the
//! write; callers that need read-your-writes must wait for the next snapshot
//! callback.
//!
//! # Example
//!
//! ```rust,no_run
//! use table_mirror::{MemoryStore, QuerySpec, Row, TableMirror};
//! use std::sync::Arc;
//!
//! # async fn example() -> table_mirror::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let mirror = TableMirror::new(store, "activities");
//!
//! mirror
//!     .initialize(|rows| println!("now showing {} rows", rows.len()), None)
//!     .await?;
//!
//! let mut row = Row::new();
//! row.insert("name".to_string(), serde_json::json!("swimming"));
//! let id = mirror.insert(row).await?;
//! println!("created {}", id);
//! # Ok(())
//! # }
//! ```

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{MirrorError, Result};
use crate::models::{row_id, ChangeEvent, QuerySpec, Row};
use crate::normalize::normalize_row;
use crate::store::{ChangeFeed, TableStore};

/// Callback receiving the full mirror snapshot after every change.
///
/// The full current list (not a diff) is handed over each time, so the
/// subscriber never has to reconcile partial updates.
pub type OnChange = Arc<dyn Fn(Vec<Row>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MirrorState {
    Uninitialized,
    Initializing,
    Active,
}

struct Control {
    state: MirrorState,
    /// Slot the apply task reads on every fan-out, so a re-initialize can
    /// swap the subscriber without touching the running task.
    on_change: Option<Arc<RwLock<OnChange>>>,
    /// Signals the apply task to close the feed and exit.
    feed_close: Option<oneshot::Sender<()>>,
    apply_task: Option<JoinHandle<()>>,
}

/// Synchronized local view of one remote table with CRUD passthrough.
pub struct TableMirror {
    store: Arc<dyn TableStore>,
    table: String,
    rows: Arc<RwLock<HashMap<String, Row>>>,
    control: Mutex<Control>,
}

impl TableMirror {
    /// Create an uninitialized mirror of `table` backed by `store`.
    pub fn new(store: Arc<dyn TableStore>, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            rows: Arc::new(RwLock::new(HashMap::new())),
            control: Mutex::new(Control {
                state: MirrorState::Uninitialized,
                on_change: None,
                feed_close: None,
                apply_task: None,
            }),
        }
    }

    /// Bulk-fetch the table, hand the snapshot to `on_change`, then open a
    /// change-feed subscription that keeps the local map current.
    ///
    /// Idempotent re-entry: if the mirror is already active, the current
    /// snapshot is replayed through `on_change` before this returns and no
    /// second subscription is opened. A stale subscription left behind by a
    /// dead feed is torn down first and initialization proceeds fresh.
    ///
    /// On bulk-fetch failure `on_change` is invoked with an empty list, the
    /// error propagates, no subscription is opened, and the mirror stays
    /// uninitialized so a later retry can succeed.
    pub async fn initialize(
        &self,
        on_change: impl Fn(Vec<Row>) + Send + Sync + 'static,
        filter: Option<QuerySpec>,
    ) -> Result<()> {
        let on_change: OnChange = Arc::new(on_change);
        let mut ctl = self.control.lock().await;

        if ctl.state == MirrorState::Active {
            let alive = ctl
                .apply_task
                .as_ref()
                .map(|t| !t.is_finished())
                .unwrap_or(false);
            if alive {
                debug!(
                    "[MIRROR] initialize: '{}' already active, replaying snapshot",
                    self.table
                );
                on_change(self.to_array());
                // Later feed events fan out to the new subscriber.
                if let Some(slot) = &ctl.on_change {
                    if let Ok(mut cb) = slot.write() {
                        *cb = on_change;
                    }
                }
                return Ok(());
            }
            // Half-dead remnant of a previous attempt: clean it up and
            // initialize from scratch.
            warn!(
                "[MIRROR] initialize: '{}' has a stale feed, tearing it down",
                self.table
            );
            Self::teardown_locked(&mut ctl, &self.rows);
        }

        ctl.state = MirrorState::Initializing;
        let query = filter.unwrap_or_default();

        debug!("[MIRROR] initialize: bulk fetch of '{}'", self.table);
        let fetched = match self.store.fetch_rows(&self.table, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!("[MIRROR] initialize: bulk fetch of '{}' failed: {}", self.table, e);
                ctl.state = MirrorState::Uninitialized;
                on_change(Vec::new());
                return Err(e);
            }
        };

        {
            let mut map = self
                .rows
                .write()
                .map_err(|e| MirrorError::InternalError(e.to_string()))?;
            map.clear();
            for mut row in fetched {
                normalize_row(&mut row);
                match row_id(&row) {
                    Some(id) => {
                        map.insert(id.to_string(), row);
                    }
                    None => warn!(
                        "[MIRROR] initialize: '{}' returned a row without an id, skipping",
                        self.table
                    ),
                }
            }
        }
        on_change(self.to_array());

        let feed = match self.store.subscribe(&self.table, &query).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!("[MIRROR] initialize: subscribe to '{}' failed: {}", self.table, e);
                Self::teardown_locked(&mut ctl, &self.rows);
                // The populated snapshot already went out; retract it so the
                // subscriber is not left rendering rows the mirror dropped.
                on_change(Vec::new());
                return Err(e);
            }
        };

        let (close_tx, close_rx) = oneshot::channel();
        let slot = Arc::new(RwLock::new(on_change));
        let task = tokio::spawn(apply_loop(
            feed,
            close_rx,
            Arc::clone(&self.rows),
            Arc::clone(&slot),
            self.table.clone(),
        ));

        ctl.on_change = Some(slot);
        ctl.feed_close = Some(close_tx);
        ctl.apply_task = Some(task);
        ctl.state = MirrorState::Active;
        debug!("[MIRROR] initialize: '{}' active", self.table);
        Ok(())
    }

    /// Insert a row remotely. The store assigns `id` and `created_at` (any
    /// values present for those fields are stripped before sending); the
    /// assigned identifier is returned. Local state is updated only by the
    /// change-feed echo.
    pub async fn insert(&self, mut row: Row) -> Result<String> {
        row.remove("id");
        row.remove("created_at");
        let stored = self.store.insert_row(&self.table, row).await?;
        row_id(&stored)
            .map(str::to_owned)
            .ok_or_else(|| MirrorError::MalformedRow("inserted row came back without an id".into()))
    }

    /// Apply a partial update to one remote row, keyed by identifier.
    pub async fn update(&self, id: &str, partial: Row) -> Result<()> {
        self.store.update_row(&self.table, id, partial).await
    }

    /// Insert or replace one remote row keyed by its `id` field. Same
    /// echo-only discipline as [`insert`](TableMirror::insert).
    pub async fn upsert(&self, row: Row) -> Result<String> {
        let stored = self.store.upsert_row(&self.table, row).await?;
        row_id(&stored)
            .map(str::to_owned)
            .ok_or_else(|| MirrorError::MalformedRow("upserted row came back without an id".into()))
    }

    /// Delete one remote row by identifier.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete_row(&self.table, id).await
    }

    /// Delete all remote rows, or only those where `filter_column` equals
    /// `filter_value` when both are given.
    pub async fn delete_all(
        &self,
        filter_column: Option<&str>,
        filter_value: Option<serde_json::Value>,
    ) -> Result<()> {
        let query = match (filter_column, filter_value) {
            (Some(column), Some(value)) => QuerySpec::filtered(column, value),
            _ => QuerySpec::all(),
        };
        self.store.delete_rows(&self.table, &query).await
    }

    /// Synchronous snapshot of the current local mirror. Order is not
    /// meaningful; display ordering is the renderer's concern.
    pub fn to_array(&self) -> Vec<Row> {
        match self.rows.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// True once `initialize` has completed and the feed is applying events.
    pub async fn is_initialized(&self) -> bool {
        self.control.lock().await.state == MirrorState::Active
    }

    /// Unsubscribe the change feed, clear the local map, and reset to the
    /// uninitialized state. Safe to call repeatedly, and safe to call on a
    /// mirror that was never initialized.
    pub async fn teardown(&self) {
        let mut ctl = self.control.lock().await;
        Self::teardown_locked(&mut ctl, &self.rows);
        debug!("[MIRROR] teardown: '{}' reset", self.table);
    }

    fn teardown_locked(ctl: &mut Control, rows: &Arc<RwLock<HashMap<String, Row>>>) {
        if let Some(tx) = ctl.feed_close.take() {
            let _ = tx.send(());
        }
        if let Some(task) = ctl.apply_task.take() {
            task.abort();
        }
        if let Ok(mut map) = rows.write() {
            map.clear();
        }
        ctl.on_change = None;
        ctl.state = MirrorState::Uninitialized;
    }
}

impl Drop for TableMirror {
    fn drop(&mut self) {
        // The async teardown path is preferred; this covers mirrors dropped
        // without one. Aborting the apply task drops the feed, whose own Drop
        // signals the producer.
        let ctl = self.control.get_mut();
        if let Some(task) = ctl.apply_task.take() {
            task.abort();
        }
    }
}

/// Apply change-feed events to the shared map and fan the snapshot out.
///
/// Insert and update upsert by id, last-writer-wins; a delete for an unknown
/// id is a silent no-op. Feed-level errors are logged and skipped: nothing
/// here is fatal, the worst case is a stale list.
async fn apply_loop(
    mut feed: ChangeFeed,
    mut close_rx: oneshot::Receiver<()>,
    rows: Arc<RwLock<HashMap<String, Row>>>,
    on_change: Arc<RwLock<OnChange>>,
    table: String,
) {
    loop {
        let event = tokio::select! {
            biased;

            _ = &mut close_rx => {
                feed.close();
                return;
            }

            event = feed.next() => match event {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!("[MIRROR] feed error on '{}': {}", table, e);
                    continue;
                }
                None => {
                    debug!("[MIRROR] feed for '{}' ended", table);
                    return;
                }
            },
        };

        let applied = {
            let mut map = match rows.write() {
                Ok(map) => map,
                Err(_) => return,
            };
            match event {
                ChangeEvent::Insert { mut row } | ChangeEvent::Update { mut row } => {
                    normalize_row(&mut row);
                    match row_id(&row) {
                        Some(id) => {
                            map.insert(id.to_string(), row);
                            true
                        }
                        None => {
                            warn!("[MIRROR] change on '{}' carried no id, skipping", table);
                            false
                        }
                    }
                }
                ChangeEvent::Delete { id } => {
                    // Removing an id never seen locally is a no-op; the
                    // snapshot still goes out so subscribers stay consistent.
                    map.remove(&id);
                    true
                }
            }
        };

        if applied {
            let snapshot: Vec<Row> = match rows.read() {
                Ok(map) => map.values().cloned().collect(),
                Err(_) => return,
            };
            // Read the slot fresh each time; a re-initialize may have
            // swapped the subscriber since the last event.
            let callback = match on_change.read() {
                Ok(cb) => Arc::clone(&*cb),
                Err(_) => return,
            };
            callback(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    /// Store whose bulk fetch always fails; mutations are unreachable.
    struct FailingStore;

    #[async_trait]
    impl TableStore for FailingStore {
        async fn fetch_rows(&self, _table: &str, _query: &QuerySpec) -> Result<Vec<Row>> {
            Err(MirrorError::ServerError {
                status_code: 503,
                message: "unavailable".to_string(),
            })
        }
        async fn insert_row(&self, _table: &str, _row: Row) -> Result<Row> {
            unreachable!("not used in these tests")
        }
        async fn update_row(&self, _table: &str, _id: &str, _partial: Row) -> Result<()> {
            unreachable!("not used in these tests")
        }
        async fn upsert_row(&self, _table: &str, _row: Row) -> Result<Row> {
            unreachable!("not used in these tests")
        }
        async fn delete_row(&self, _table: &str, _id: &str) -> Result<()> {
            unreachable!("not used in these tests")
        }
        async fn delete_rows(&self, _table: &str, _query: &QuerySpec) -> Result<()> {
            unreachable!("not used in these tests")
        }
        async fn subscribe(&self, _table: &str, _query: &QuerySpec) -> Result<ChangeFeed> {
            unreachable!("subscribe must not be reached after a failed fetch")
        }
    }

    /// Store whose bulk fetch succeeds but whose feed cannot be opened.
    struct SubscribeFailingStore;

    #[async_trait]
    impl TableStore for SubscribeFailingStore {
        async fn fetch_rows(&self, _table: &str, _query: &QuerySpec) -> Result<Vec<Row>> {
            let mut row = Row::new();
            row.insert("id".to_string(), json!("1"));
            row.insert("name".to_string(), json!("transient"));
            Ok(vec![row])
        }
        async fn insert_row(&self, _table: &str, _row: Row) -> Result<Row> {
            unreachable!("not used in these tests")
        }
        async fn update_row(&self, _table: &str, _id: &str, _partial: Row) -> Result<()> {
            unreachable!("not used in these tests")
        }
        async fn upsert_row(&self, _table: &str, _row: Row) -> Result<Row> {
            unreachable!("not used in these tests")
        }
        async fn delete_row(&self, _table: &str, _id: &str) -> Result<()> {
            unreachable!("not used in these tests")
        }
        async fn delete_rows(&self, _table: &str, _query: &QuerySpec) -> Result<()> {
            unreachable!("not used in these tests")
        }
        async fn subscribe(&self, _table: &str, _query: &QuerySpec) -> Result<ChangeFeed> {
            Err(MirrorError::WebSocketError("feed unavailable".to_string()))
        }
    }

    /// Collects every snapshot handed to the on_change callback.
    #[derive(Clone, Default)]
    struct SnapshotLog(Arc<StdMutex<Vec<Vec<Row>>>>);

    impl SnapshotLog {
        fn callback(&self) -> impl Fn(Vec<Row>) + Send + Sync + 'static {
            let log = Arc::clone(&self.0);
            move |rows| log.lock().unwrap().push(rows)
        }
        fn len(&self) -> usize {
            self.0.lock().unwrap().len()
        }
        fn last(&self) -> Vec<Row> {
            self.0.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    fn activity(name: &str) -> Row {
        let mut row = Row::new();
        row.insert("name".to_string(), json!(name));
        row
    }

    /// Let spawned tasks drain pending channel events on the current-thread
    /// test runtime.
    async fn settle() {
        for _ in 0..64 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_initialize_populates_and_notifies() {
        let store = Arc::new(MemoryStore::new());
        store.seed("activities", {
            let mut row = activity("hiking");
            row.insert("id".to_string(), json!("1"));
            row.insert("created_at".to_string(), json!("2024-01-01T00:00:00Z"));
            row
        });

        let mirror = TableMirror::new(store, "activities");
        let log = SnapshotLog::default();
        mirror.initialize(log.callback(), None).await.unwrap();

        assert!(mirror.is_initialized().await);
        assert_eq!(log.len(), 1);
        let snapshot = mirror.to_array();
        assert_eq!(snapshot.len(), 1);
        // Timestamp arrived as an ISO string, stored as epoch millis
        assert_eq!(snapshot[0]["created_at"], json!(1_704_067_200_000_i64));
    }

    #[tokio::test]
    async fn test_initialize_twice_replays_without_resubscribing() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "activities");
        let log = SnapshotLog::default();

        mirror.initialize(log.callback(), None).await.unwrap();
        assert_eq!(store.feed_count(), 1);
        assert_eq!(store.fetch_count(), 1);

        mirror.initialize(log.callback(), None).await.unwrap();
        // Replayed synchronously, no second subscription, no refetch
        assert_eq!(log.len(), 2);
        assert_eq!(store.feed_count(), 1);
        assert_eq!(store.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_reinitialize_swaps_the_live_subscriber() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "activities");
        let first = SnapshotLog::default();
        let second = SnapshotLog::default();

        mirror.initialize(first.callback(), None).await.unwrap();
        mirror.initialize(second.callback(), None).await.unwrap();
        assert_eq!(second.len(), 1, "re-initialize replays to the new callback");

        mirror.insert(activity("later")).await.unwrap();
        settle().await;

        // The feed event reaches the newest subscriber, not the replaced one.
        assert_eq!(second.len(), 2);
        assert_eq!(second.last().len(), 1);
        assert_eq!(first.len(), 1, "replaced callback must not receive feed events");
    }

    #[tokio::test]
    async fn test_initialize_failure_leaves_mirror_retryable() {
        let mirror = TableMirror::new(Arc::new(FailingStore), "activities");
        let log = SnapshotLog::default();

        let err = mirror
            .initialize(log.callback(), None)
            .await
            .expect_err("failed fetch must propagate");
        assert!(matches!(err, MirrorError::ServerError { status_code: 503, .. }));
        // Empty-list callback fired, state stayed uninitialized
        assert_eq!(log.len(), 1);
        assert!(log.last().is_empty());
        assert!(!mirror.is_initialized().await);
    }

    #[tokio::test]
    async fn test_subscribe_failure_retracts_published_snapshot() {
        let mirror = TableMirror::new(Arc::new(SubscribeFailingStore), "activities");
        let log = SnapshotLog::default();

        let err = mirror
            .initialize(log.callback(), None)
            .await
            .expect_err("failed subscribe must propagate");
        assert!(matches!(err, MirrorError::WebSocketError(_)));

        // Populated snapshot went out before the subscribe attempt, an empty
        // one follows so the subscriber matches the cleared mirror.
        assert_eq!(log.len(), 2);
        assert!(log.last().is_empty());
        assert!(mirror.to_array().is_empty());
        assert!(!mirror.is_initialized().await);
    }

    #[tokio::test]
    async fn test_event_sequence_insert_insert_update_delete() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "activities");
        let log = SnapshotLog::default();
        mirror.initialize(log.callback(), None).await.unwrap();

        let a = mirror.insert(activity("a")).await.unwrap();
        let b = mirror.insert(activity("b")).await.unwrap();
        mirror
            .update(&a, {
                let mut p = Row::new();
                p.insert("name".to_string(), json!("a-updated"));
                p
            })
            .await
            .unwrap();
        mirror.delete(&b).await.unwrap();
        settle().await;

        let snapshot = mirror.to_array();
        assert_eq!(snapshot.len(), 1, "only updated A must remain");
        assert_eq!(row_id(&snapshot[0]), Some(a.as_str()));
        assert_eq!(snapshot[0]["name"], json!("a-updated"));
    }

    #[tokio::test]
    async fn test_mutations_wait_for_echo() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(store, "activities");
        let log = SnapshotLog::default();
        mirror.initialize(log.callback(), None).await.unwrap();

        // Echo-only: right after insert returns the local map may not yet
        // contain the row; after the echo settles it must.
        mirror.insert(activity("later")).await.unwrap();
        settle().await;
        assert_eq!(mirror.to_array().len(), 1);
        assert!(log.len() >= 2);
    }

    #[tokio::test]
    async fn test_teardown_clears_and_reinitialize_refetches() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "activities");
        let log = SnapshotLog::default();

        mirror.initialize(log.callback(), None).await.unwrap();
        mirror.insert(activity("x")).await.unwrap();
        settle().await;
        assert_eq!(mirror.to_array().len(), 1);

        mirror.teardown().await;
        assert!(mirror.to_array().is_empty());
        assert!(!mirror.is_initialized().await);
        // Idempotent, and safe again right away
        mirror.teardown().await;

        mirror.initialize(log.callback(), None).await.unwrap();
        assert_eq!(store.fetch_count(), 2, "re-initialize must fetch again");
        assert_eq!(mirror.to_array().len(), 1);
    }

    #[tokio::test]
    async fn test_teardown_before_initialize_is_safe() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(store, "activities");
        mirror.teardown().await;
        assert!(mirror.to_array().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_delete_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "activities");
        let log = SnapshotLog::default();
        mirror.initialize(log.callback(), None).await.unwrap();

        let id = mirror.insert(activity("keep")).await.unwrap();
        settle().await;

        // Delete for an id the mirror has never seen
        mirror.delete("never-seen").await.unwrap();
        settle().await;
        let snapshot = mirror.to_array();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(row_id(&snapshot[0]), Some(id.as_str()));
    }

    #[tokio::test]
    async fn test_filtered_mirror_only_tracks_matching_rows() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "expenses");
        let log = SnapshotLog::default();
        mirror
            .initialize(
                log.callback(),
                Some(QuerySpec::filtered("kind", json!("income"))),
            )
            .await
            .unwrap();

        let mut income = activity("salary");
        income.insert("kind".to_string(), json!("income"));
        let mut expense = activity("rent");
        expense.insert("kind".to_string(), json!("expense"));
        mirror.insert(income).await.unwrap();
        mirror.insert(expense).await.unwrap();
        settle().await;

        let snapshot = mirror.to_array();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0]["name"], json!("salary"));
    }

    #[tokio::test]
    async fn test_insert_strips_client_supplied_server_fields() {
        let store = Arc::new(MemoryStore::new());
        let mirror = TableMirror::new(Arc::clone(&store) as Arc<dyn TableStore>, "activities");
        let log = SnapshotLog::default();
        mirror.initialize(log.callback(), None).await.unwrap();

        let mut row = activity("sneaky");
        row.insert("id".to_string(), json!("client-picked"));
        let id = mirror.insert(row).await.unwrap();
        assert_ne!(id, "client-picked");
    }
}
