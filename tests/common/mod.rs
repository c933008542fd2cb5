//! Shared helpers for integration tests.

use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, Once};
use table_mirror::Row;

static INIT_LOGGER: Once = Once::new();

/// Initialize env_logger once for the whole test binary.
pub fn init_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// Build a row from column/value pairs.
pub fn row(pairs: &[(&str, JsonValue)]) -> Row {
    let mut row = Row::new();
    for (column, value) in pairs {
        row.insert((*column).to_string(), value.clone());
    }
    row
}

/// Records every snapshot published by a mirror callback.
#[derive(Clone, Default)]
pub struct SnapshotLog {
    snapshots: Arc<Mutex<Vec<Vec<Row>>>>,
}

impl SnapshotLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callback suitable for `TableMirror::initialize`.
    pub fn sink(&self) -> impl Fn(Vec<Row>) + Send + Sync + 'static {
        let snapshots = Arc::clone(&self.snapshots);
        move |rows| {
            if let Ok(mut log) = snapshots.lock() {
                log.push(rows);
            }
        }
    }

    /// Number of snapshots published so far.
    pub fn count(&self) -> usize {
        self.snapshots.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// The most recent snapshot, if any.
    pub fn last(&self) -> Option<Vec<Row>> {
        self.snapshots
            .lock()
            .ok()
            .and_then(|log| log.last().cloned())
    }
}

/// Let spawned feed tasks drain their channels.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}
