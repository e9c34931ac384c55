//! DispatchStore - async handle to the durable queue

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use contracts::{Dispatch, StoreConfig};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use crate::editor::DispatchEditor;
use crate::error::{PersistenceError, Result};
use crate::queue::{EditOp, EditSummary, PendingSnapshot, QueueDb};
use crate::schema;
use crate::sequencer::Sequencer;

/// Capacity and retention of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Maximum number of Dispatch rows (-1 = unbounded)
    pub max_queue_size: i64,

    /// How long a Dispatch may stay queued
    pub expiration: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            expiration: Duration::from_secs(86_400),
        }
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_queue_size: config.max_queue_size,
            expiration: config.expiration(),
        }
    }
}

/// Durable multi-consumer dispatch queue
///
/// Cheap to clone; all clones share one sequencer thread.
#[derive(Clone)]
pub struct DispatchStore {
    sequencer: Sequencer,
    snapshot: watch::Receiver<PendingSnapshot>,
    path: Option<PathBuf>,
}

impl DispatchStore {
    /// Open (or create) the store at `path`
    ///
    /// # Errors
    /// [`PersistenceError::Open`] when the database cannot be opened or initialized.
    #[instrument(name = "dispatch_store_open", skip(path, options), fields(path = %path.display()))]
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        let open_error = |source| PersistenceError::Open {
            path: path.to_path_buf(),
            source,
        };
        let conn = Connection::open(path).map_err(open_error)?;
        schema::initialize(&conn).map_err(open_error)?;

        let store = Self::start(conn, options, Some(path.to_path_buf()))?;
        info!(
            max_queue_size = options.max_queue_size,
            expiration_secs = options.expiration.as_secs(),
            "dispatch store opened"
        );
        Ok(store)
    }

    /// Open a private in-memory store
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let open_error = |source| PersistenceError::Open {
            path: PathBuf::from(":memory:"),
            source,
        };
        let conn = Connection::open_in_memory().map_err(open_error)?;
        schema::initialize(&conn).map_err(open_error)?;
        Self::start(conn, options, None)
    }

    fn start(conn: Connection, options: StoreOptions, path: Option<PathBuf>) -> Result<Self> {
        let (db, snapshot) = QueueDb::new(conn, options)?;
        let sequencer = Sequencer::spawn(db)?;
        Ok(Self {
            sequencer,
            snapshot,
            path,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start a transactional edit
    pub fn editor(&self) -> DispatchEditor {
        DispatchEditor::new(self.clone())
    }

    pub(crate) async fn apply(&self, ops: Vec<EditOp>) -> Result<EditSummary> {
        self.sequencer.run(move |db| db.apply(&ops)).await
    }

    // ===== Mutations =====

    /// Persist `dispatch` for every consumer in `consumers`
    ///
    /// Enqueueing an existing id replaces its payload. Nothing is stored when
    /// `consumers` is empty.
    pub async fn enqueue(&self, dispatch: Dispatch, consumers: &HashSet<String>) -> Result<()> {
        self.enqueue_many(vec![dispatch], consumers).await?;
        Ok(())
    }

    /// Persist several Dispatches in one transaction
    ///
    /// Returns how many were stored. Oldest rows are evicted first when the
    /// store is full; when the batch alone exceeds the capacity only its newest
    /// Dispatches are kept.
    pub async fn enqueue_many(
        &self,
        dispatches: Vec<Dispatch>,
        consumers: &HashSet<String>,
    ) -> Result<usize> {
        let count = dispatches.len();
        let summary = self
            .apply(vec![EditOp::Enqueue {
                dispatches,
                consumers: consumers.clone(),
            }])
            .await?;

        debug!(
            count,
            stored = summary.stored,
            evicted = summary.evicted,
            consumers = consumers.len(),
            "dispatches enqueued"
        );
        Ok(summary.stored)
    }

    /// Mark `dispatch_id` delivered to `consumer`
    pub async fn acknowledge(&self, dispatch_id: &str, consumer: &str) -> Result<()> {
        self.acknowledge_many(vec![dispatch_id.to_string()], consumer)
            .await?;
        Ok(())
    }

    /// Mark every id in `dispatch_ids` delivered to `consumer`
    ///
    /// Dispatch rows whose last queue entry is removed are deleted in the same
    /// transaction. Returns the number of queue entries removed.
    pub async fn acknowledge_many(&self, dispatch_ids: Vec<String>, consumer: &str) -> Result<usize> {
        if dispatch_ids.is_empty() {
            return Ok(0);
        }
        let summary = self
            .apply(vec![EditOp::Acknowledge {
                ids: dispatch_ids,
                consumer: consumer.to_string(),
            }])
            .await?;
        Ok(summary.removed)
    }

    /// Drop every pending entry of `consumer`
    pub async fn reset_consumer(&self, consumer: &str) -> Result<usize> {
        let summary = self
            .apply(vec![EditOp::ResetConsumer {
                consumer: consumer.to_string(),
            }])
            .await?;
        debug!(consumer, removed = summary.removed, "consumer queue reset");
        Ok(summary.removed)
    }

    /// Drop entries of every consumer not in `active`
    ///
    /// The first call on a store also migrates rows of the legacy single-table
    /// layout, fanning them out to `active`.
    pub async fn delete_queues_not_in(&self, active: HashSet<String>) -> Result<usize> {
        self.sequencer
            .run(move |db| db.delete_queues_not_in(&active))
            .await
    }

    /// Delete every Dispatch with a timestamp before `older_than`
    pub async fn expire(&self, older_than: i64) -> Result<usize> {
        self.sequencer.run(move |db| db.expire(older_than)).await
    }

    /// Delete every Dispatch past the configured expiration
    pub async fn expire_stale(&self) -> Result<usize> {
        self.sequencer
            .run(|db| {
                let floor = db.not_older_than();
                db.expire(floor)
            })
            .await
    }

    /// Delete the `count` globally oldest Dispatches
    pub async fn evict_oldest(&self, count: usize) -> Result<usize> {
        self.sequencer.run(move |db| db.evict_oldest(count)).await
    }

    /// Change the capacity, evicting the oldest rows above it
    pub async fn resize(&self, max_queue_size: i64) -> Result<usize> {
        self.sequencer.run(move |db| db.resize(max_queue_size)).await
    }

    /// Change the expiration
    ///
    /// Rows older than the shorter of the old and new expiration are deleted first.
    pub async fn set_expiration(&self, expiration: Duration) -> Result<usize> {
        self.sequencer
            .run(move |db| db.set_expiration(expiration))
            .await
    }

    // ===== Queries =====

    /// Up to `limit` pending Dispatches for `consumer`, oldest first
    ///
    /// Skips ids in `excluding` and Dispatches older than `not_older_than`.
    pub async fn pending_batch(
        &self,
        consumer: &str,
        excluding: HashSet<String>,
        limit: usize,
        not_older_than: i64,
    ) -> Result<Vec<Dispatch>> {
        let consumer = consumer.to_string();
        self.sequencer
            .run(move |db| db.pending_batch(&consumer, &excluding, limit, not_older_than))
            .await
    }

    /// [`DispatchStore::pending_batch`] with the configured expiry floor
    pub async fn next_batch(
        &self,
        consumer: &str,
        excluding: HashSet<String>,
        limit: usize,
    ) -> Result<Vec<Dispatch>> {
        let consumer = consumer.to_string();
        self.sequencer
            .run(move |db| {
                let floor = db.not_older_than();
                db.pending_batch(&consumer, &excluding, limit, floor)
            })
            .await
    }

    /// Pending Dispatches for `consumer` not older than `not_older_than`
    pub async fn pending_count_since(&self, consumer: &str, not_older_than: i64) -> Result<usize> {
        let consumer = consumer.to_string();
        self.sequencer
            .run(move |db| db.pending_count(&consumer, not_older_than))
            .await
    }

    /// Pending Dispatches for `consumer`, expired ones included
    pub async fn pending_count(&self, consumer: &str) -> Result<usize> {
        self.pending_count_since(consumer, i64::MIN).await
    }

    /// Number of Dispatch rows
    pub async fn size(&self) -> Result<usize> {
        self.sequencer.run(|db| db.size()).await
    }

    /// Number of queue entries across all consumers
    pub async fn queue_entry_count(&self) -> Result<usize> {
        self.sequencer.run(|db| db.queue_entry_count()).await
    }

    /// Consumers with at least one queue entry
    pub async fn consumers(&self) -> Result<Vec<String>> {
        self.sequencer.run(|db| db.consumers()).await
    }

    /// Current capacity and retention
    pub async fn options(&self) -> Result<StoreOptions> {
        self.sequencer.run(|db| Ok(db.options())).await
    }

    // ===== Pending count snapshots =====

    /// Latest pending counts
    pub fn snapshot(&self) -> PendingSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Follow pending counts; a new snapshot is published after every committed change
    pub fn subscribe_snapshots(&self) -> watch::Receiver<PendingSnapshot> {
        self.snapshot.clone()
    }
}

impl std::fmt::Debug for DispatchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchStore")
            .field("path", &self.path)
            .finish()
    }
}
