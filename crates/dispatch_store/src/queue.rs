//! Synchronous queue operations
//!
//! [`QueueDb`] owns the SQLite connection and runs exclusively on the sequencer
//! thread. Every mutation runs in one `IMMEDIATE` transaction and publishes a fresh
//! [`PendingSnapshot`] after it commits.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use contracts::Dispatch;
use rusqlite::{params, params_from_iter, Connection, Transaction, TransactionBehavior};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::Result;
use crate::schema;
use crate::{now_millis, StoreOptions};

/// Pending counts per consumer, excluding expired Dispatches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSnapshot {
    /// Consumers with at least one pending Dispatch
    pub counts: HashMap<String, usize>,

    /// Timestamp floor the counts were computed with
    pub not_older_than: i64,
}

impl PendingSnapshot {
    /// Pending count for `consumer_id` (0 when absent)
    pub fn pending(&self, consumer_id: &str) -> usize {
        self.counts.get(consumer_id).copied().unwrap_or(0)
    }
}

/// One operation of a [`crate::DispatchEditor`]
#[derive(Debug, Clone)]
pub(crate) enum EditOp {
    Enqueue {
        dispatches: Vec<Dispatch>,
        consumers: HashSet<String>,
    },
    Acknowledge {
        ids: Vec<String>,
        consumer: String,
    },
    ResetConsumer {
        consumer: String,
    },
}

/// What a committed set of operations changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditSummary {
    /// Dispatch rows written
    pub stored: usize,
    /// Dispatch rows evicted to make room
    pub evicted: usize,
    /// Queue entries removed by acknowledgement or reset
    pub removed: usize,
}

pub(crate) struct QueueDb {
    conn: Connection,
    options: StoreOptions,
    migration_attempted: bool,
    snapshot_tx: watch::Sender<PendingSnapshot>,
}

impl QueueDb {
    pub(crate) fn new(
        conn: Connection,
        options: StoreOptions,
    ) -> Result<(Self, watch::Receiver<PendingSnapshot>)> {
        let (snapshot_tx, snapshot_rx) = watch::channel(PendingSnapshot::default());
        let db = Self {
            conn,
            options,
            migration_attempted: false,
            snapshot_tx,
        };
        db.publish_snapshot()?;
        Ok((db, snapshot_rx))
    }

    pub(crate) fn options(&self) -> StoreOptions {
        self.options
    }

    // ===== Mutations =====

    pub(crate) fn apply(&mut self, ops: &[EditOp]) -> Result<EditSummary> {
        let max_queue_size = self.options.max_queue_size;
        let tx = self.begin()?;
        let mut summary = EditSummary::default();

        for op in ops {
            match op {
                EditOp::Enqueue {
                    dispatches,
                    consumers,
                } => {
                    let (stored, evicted) =
                        insert_dispatches(&tx, dispatches, consumers, max_queue_size)?;
                    summary.stored += stored;
                    summary.evicted += evicted;
                }
                EditOp::Acknowledge { ids, consumer } => {
                    summary.removed += delete_entries(&tx, ids, consumer)?;
                }
                EditOp::ResetConsumer { consumer } => {
                    let removed = tx.execute(schema::DELETE_QUEUE_FOR_CONSUMER, [consumer])?;
                    tx.execute(schema::DELETE_ORPHANED_DISPATCHES, [])?;
                    summary.removed += removed;
                }
            }
        }

        tx.commit()?;
        observability::record_dispatches_enqueued(summary.stored);
        observability::record_dispatches_evicted(summary.evicted);
        self.publish_snapshot()?;
        Ok(summary)
    }

    pub(crate) fn delete_queues_not_in(&mut self, active: &HashSet<String>) -> Result<usize> {
        let tx = self.begin()?;
        let removed = tx.execute(
            &schema::delete_queues_not_in(active.len()),
            params_from_iter(active.iter()),
        )?;
        tx.execute(schema::DELETE_ORPHANED_DISPATCHES, [])?;
        tx.commit()?;

        if !self.migration_attempted {
            self.migration_attempted = true;
            // A failed migration leaves the legacy rows where they are.
            if let Err(e) = self.migrate_legacy(active) {
                warn!(error = %e, "legacy dispatch migration failed");
            }
        }

        self.publish_snapshot()?;
        Ok(removed)
    }

    pub(crate) fn expire(&mut self, older_than: i64) -> Result<usize> {
        let tx = self.begin()?;
        tx.execute(schema::DELETE_QUEUE_OLDER_THAN, [older_than])?;
        let expired = tx.execute(schema::DELETE_DISPATCH_OLDER_THAN, [older_than])?;
        tx.commit()?;

        observability::record_dispatches_expired(expired);
        self.publish_snapshot()?;
        Ok(expired)
    }

    pub(crate) fn evict_oldest(&mut self, count: usize) -> Result<usize> {
        let tx = self.begin()?;
        let evicted = evict_oldest_in(&tx, count, &HashSet::new())?;
        tx.commit()?;

        observability::record_dispatches_evicted(evicted);
        self.publish_snapshot()?;
        Ok(evicted)
    }

    pub(crate) fn resize(&mut self, max_queue_size: i64) -> Result<usize> {
        self.options.max_queue_size = max_queue_size;
        let size = self.size()?;
        let excess = space_required(size, 0, max_queue_size);
        if excess == 0 {
            return Ok(0);
        }
        self.evict_oldest(excess)
    }

    pub(crate) fn set_expiration(&mut self, expiration: Duration) -> Result<usize> {
        let shortest = self.options.expiration.min(expiration);
        let expired = self.expire(expiry_floor(now_millis(), shortest))?;
        self.options.expiration = expiration;
        self.publish_snapshot()?;
        Ok(expired)
    }

    // ===== Queries =====

    pub(crate) fn pending_batch(
        &self,
        consumer: &str,
        excluding: &HashSet<String>,
        limit: usize,
        not_older_than: i64,
    ) -> Result<Vec<Dispatch>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let sql = schema::select_pending_batch(excluding.len());
        let mut stmt = self.conn.prepare_cached(&sql)?;

        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(excluding.len() + 3);
        values.push(consumer.to_string().into());
        values.push(not_older_than.into());
        values.extend(excluding.iter().map(|id| id.clone().into()));
        values.push((limit.min(i64::MAX as usize) as i64).into());

        let rows = stmt.query_map(params_from_iter(values), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut batch = Vec::with_capacity(limit);
        for row in rows {
            let (id, timestamp, payload) = row?;
            match Dispatch::from_stored(&id, timestamp, &payload) {
                Ok(dispatch) => batch.push(dispatch),
                Err(e) => warn!(dispatch_id = %id, error = %e, "skipping unreadable dispatch"),
            }
        }
        Ok(batch)
    }

    pub(crate) fn pending_count(&self, consumer: &str, not_older_than: i64) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row(schema::COUNT_PENDING, params![consumer, not_older_than], |row| {
                    row.get(0)
                })?;
        Ok(count.max(0) as usize)
    }

    pub(crate) fn size(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(schema::COUNT_DISPATCHES, [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub(crate) fn queue_entry_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(schema::COUNT_QUEUE_ENTRIES, [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    pub(crate) fn consumers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached(schema::SELECT_CONSUMERS)?;
        let consumers = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(consumers)
    }

    /// Current expiry floor
    pub(crate) fn not_older_than(&self) -> i64 {
        expiry_floor(now_millis(), self.options.expiration)
    }

    // ===== Internals =====

    fn begin(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    fn publish_snapshot(&self) -> Result<()> {
        let not_older_than = self.not_older_than();
        let mut stmt = self.conn.prepare_cached(schema::COUNT_PENDING_BY_CONSUMER)?;
        let counts = stmt
            .query_map([not_older_than], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .map(|row| row.map(|(consumer, count)| (consumer, count.max(0) as usize)))
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;

        self.snapshot_tx.send_if_modified(|current| {
            let next = PendingSnapshot {
                counts,
                not_older_than,
            };
            // Floor moves with the clock; only count changes are news.
            if current.counts == next.counts {
                current.not_older_than = next.not_older_than;
                false
            } else {
                *current = next;
                true
            }
        });
        Ok(())
    }

    fn migrate_legacy(&mut self, consumers: &HashSet<String>) -> Result<usize> {
        if !schema::has_legacy_table(&self.conn)? {
            return Ok(0);
        }

        let cutoff = self.not_older_than();
        let tx = self.begin()?;
        let migrated = tx.execute(schema::MIGRATE_LEGACY_DISPATCHES, [cutoff])?;
        for consumer in consumers {
            tx.execute(schema::MIGRATE_LEGACY_QUEUE, params![cutoff, consumer])?;
        }
        // Without consumers the migrated rows have nobody to go to.
        tx.execute(schema::DELETE_ORPHANED_DISPATCHES, [])?;
        tx.execute(schema::DROP_LEGACY_DISPATCHES, [])?;
        tx.commit()?;

        debug!(
            migrated,
            consumers = consumers.len(),
            "migrated legacy dispatch queue"
        );
        Ok(migrated)
    }
}

fn insert_dispatches(
    tx: &Transaction<'_>,
    dispatches: &[Dispatch],
    consumers: &HashSet<String>,
    max_queue_size: i64,
) -> Result<(usize, usize)> {
    if dispatches.is_empty() || consumers.is_empty() {
        return Ok((0, 0));
    }

    let incoming = tail(dispatches, max_queue_size);
    let incoming_ids: HashSet<&str> = incoming.iter().map(|d| d.id.as_str()).collect();

    // Upserts of ids already stored do not grow the table
    let mut new_rows = 0;
    {
        let mut exists = tx.prepare_cached(schema::DISPATCH_EXISTS)?;
        for id in &incoming_ids {
            if !exists.exists([id])? {
                new_rows += 1;
            }
        }
    }

    let size: i64 = tx.query_row(schema::COUNT_DISPATCHES, [], |row| row.get(0))?;
    let evicted = evict_oldest_in(
        tx,
        space_required(size.max(0) as usize, new_rows, max_queue_size),
        &incoming_ids,
    )?;

    let mut upsert = tx.prepare_cached(schema::UPSERT_DISPATCH)?;
    let mut insert_entry = tx.prepare_cached(schema::INSERT_QUEUE_ENTRY)?;
    for dispatch in incoming {
        let payload = dispatch.payload_json()?;
        upsert.execute(params![dispatch.id, dispatch.timestamp, payload])?;
        for consumer in consumers {
            insert_entry.execute(params![dispatch.id, consumer])?;
        }
    }

    Ok((incoming.len(), evicted))
}

fn delete_entries(tx: &Transaction<'_>, ids: &[String], consumer: &str) -> Result<usize> {
    let mut delete_entry = tx.prepare_cached(schema::DELETE_QUEUE_ENTRY)?;
    let mut delete_orphan = tx.prepare_cached(schema::DELETE_DISPATCH_IF_ORPHANED)?;

    let mut removed = 0;
    for id in ids {
        removed += delete_entry.execute(params![id, consumer])?;
        delete_orphan.execute([id])?;
    }
    Ok(removed)
}

/// Evict the `count` oldest Dispatches whose id is not in `keep`
fn evict_oldest_in(tx: &Transaction<'_>, count: usize, keep: &HashSet<&str>) -> Result<usize> {
    if count == 0 {
        return Ok(0);
    }

    let ids = {
        let limit = count.saturating_add(keep.len()).min(i64::MAX as usize) as i64;
        let mut stmt = tx.prepare_cached(schema::SELECT_OLDEST_IDS)?;
        let rows = stmt.query_map([limit], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::with_capacity(count);
        for id in rows {
            let id = id?;
            if !keep.contains(id.as_str()) {
                ids.push(id);
            }
            if ids.len() == count {
                break;
            }
        }
        ids
    };

    let mut delete_entries = tx.prepare_cached(schema::DELETE_QUEUE_FOR_DISPATCH)?;
    let mut delete_dispatch = tx.prepare_cached(schema::DELETE_DISPATCH)?;
    for id in &ids {
        delete_entries.execute([id])?;
        delete_dispatch.execute([id])?;
    }
    Ok(ids.len())
}

/// Rows to evict so that `incoming` more fit under `max` (-1 = unbounded)
fn space_required(size: usize, incoming: usize, max: i64) -> usize {
    if max < 0 {
        return 0;
    }
    (size + incoming).saturating_sub(max as usize)
}

/// The newest `max` of `dispatches` (all of them when unbounded)
fn tail(dispatches: &[Dispatch], max: i64) -> &[Dispatch] {
    if max < 0 || dispatches.len() <= max as usize {
        dispatches
    } else {
        &dispatches[dispatches.len() - max as usize..]
    }
}

/// Oldest timestamp that is not yet expired
pub(crate) fn expiry_floor(now: i64, expiration: Duration) -> i64 {
    let millis = i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX);
    now.saturating_sub(millis)
}
