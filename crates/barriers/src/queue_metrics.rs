//! Pending counts per consumer, derived from store snapshots

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use contracts::{QueueMetrics, StateCell, StateStream};
use dispatch_store::{DispatchStore, PendingSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

type Cells = HashMap<String, StateCell<usize>>;

/// [`QueueMetrics`] backed by a [`DispatchStore`]
///
/// One shared cell per consumer; every subscriber of the same consumer follows it.
/// The store publishes a snapshot after each committed write, so counts never
/// reflect a half-applied change.
pub struct StoreQueueMetrics {
    cells: Arc<Mutex<Cells>>,
    snapshots: watch::Receiver<PendingSnapshot>,
    task: JoinHandle<()>,
}

impl StoreQueueMetrics {
    /// Start following `store`
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(store: &DispatchStore) -> Arc<Self> {
        let cells: Arc<Mutex<Cells>> = Arc::default();
        let snapshots = store.subscribe_snapshots();

        let task = tokio::spawn(follow_snapshots(Arc::clone(&cells), snapshots.clone()));

        Arc::new(Self {
            cells,
            snapshots,
            task,
        })
    }
}

impl QueueMetrics for StoreQueueMetrics {
    fn pending_count(&self, consumer_id: &str) -> StateStream<usize> {
        let mut cells = lock(&self.cells);
        if let Some(cell) = cells.get(consumer_id) {
            return cell.subscribe();
        }

        // Read under the lock so the follower can't publish in between.
        let current = self.snapshots.borrow().pending(consumer_id);
        let cell = StateCell::new(current);
        let stream = cell.subscribe();
        cells.insert(consumer_id.to_string(), cell);
        stream
    }
}

impl Drop for StoreQueueMetrics {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn follow_snapshots(cells: Arc<Mutex<Cells>>, mut snapshots: watch::Receiver<PendingSnapshot>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        let cells = lock(&cells);
        for (consumer, cell) in cells.iter() {
            let pending = snapshot.pending(consumer);
            if cell.set(pending) {
                observability::record_pending_count(consumer, pending);
            }
        }
    }
    debug!("store closed, queue metrics stopped");
}

fn lock(cells: &Mutex<Cells>) -> MutexGuard<'_, Cells> {
    // A panic while holding the lock can't leave the map half-updated.
    cells.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
