//! SQLite schema
//!
//! `dispatch` holds one row per event, `queue` one row per (event, consumer) still
//! waiting for delivery. Orphaned `dispatch` rows are removed explicitly by the store
//! inside the transaction that deleted their last `queue` row.

use rusqlite::{Connection, OptionalExtension};

/// Current schema version (stored in `PRAGMA user_version`)
pub const SCHEMA_VERSION: i32 = 1;

/// Table of the single-table layout used before per-consumer queues
pub const LEGACY_DISPATCHES_TABLE: &str = "dispatches";

pub(crate) const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS dispatch (
    id        TEXT PRIMARY KEY,
    timestamp INTEGER NOT NULL,
    payload   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dispatch_timestamp ON dispatch(timestamp);

CREATE TABLE IF NOT EXISTS queue (
    dispatch_id TEXT NOT NULL REFERENCES dispatch(id),
    consumer_id TEXT NOT NULL,
    PRIMARY KEY (dispatch_id, consumer_id)
);

CREATE INDEX IF NOT EXISTS idx_queue_consumer ON queue(consumer_id);
"#;

pub(crate) const UPSERT_DISPATCH: &str = "INSERT INTO dispatch (id, timestamp, payload) VALUES (?1, ?2, ?3)
     ON CONFLICT(id) DO UPDATE SET timestamp = excluded.timestamp, payload = excluded.payload";

pub(crate) const INSERT_QUEUE_ENTRY: &str =
    "INSERT OR IGNORE INTO queue (dispatch_id, consumer_id) VALUES (?1, ?2)";

pub(crate) const DELETE_QUEUE_ENTRY: &str =
    "DELETE FROM queue WHERE dispatch_id = ?1 AND consumer_id = ?2";

pub(crate) const DELETE_DISPATCH_IF_ORPHANED: &str = "DELETE FROM dispatch WHERE id = ?1
     AND NOT EXISTS (SELECT 1 FROM queue WHERE dispatch_id = ?1)";

pub(crate) const DELETE_ORPHANED_DISPATCHES: &str =
    "DELETE FROM dispatch WHERE NOT EXISTS (SELECT 1 FROM queue WHERE queue.dispatch_id = dispatch.id)";

pub(crate) const DELETE_QUEUE_FOR_CONSUMER: &str = "DELETE FROM queue WHERE consumer_id = ?1";

pub(crate) const DELETE_QUEUE_OLDER_THAN: &str = "DELETE FROM queue WHERE dispatch_id IN
     (SELECT id FROM dispatch WHERE timestamp < ?1)";

pub(crate) const DELETE_DISPATCH_OLDER_THAN: &str = "DELETE FROM dispatch WHERE timestamp < ?1";

pub(crate) const SELECT_OLDEST_IDS: &str =
    "SELECT id FROM dispatch ORDER BY timestamp ASC, rowid ASC LIMIT ?1";

pub(crate) const DELETE_QUEUE_FOR_DISPATCH: &str = "DELETE FROM queue WHERE dispatch_id = ?1";

pub(crate) const DELETE_DISPATCH: &str = "DELETE FROM dispatch WHERE id = ?1";

pub(crate) const DISPATCH_EXISTS: &str = "SELECT 1 FROM dispatch WHERE id = ?1";

pub(crate) const COUNT_DISPATCHES: &str = "SELECT COUNT(*) FROM dispatch";

pub(crate) const COUNT_QUEUE_ENTRIES: &str = "SELECT COUNT(*) FROM queue";

pub(crate) const COUNT_PENDING: &str = "SELECT COUNT(*) FROM queue q
     JOIN dispatch d ON d.id = q.dispatch_id
     WHERE q.consumer_id = ?1 AND d.timestamp >= ?2";

pub(crate) const COUNT_PENDING_BY_CONSUMER: &str = "SELECT q.consumer_id, COUNT(*) FROM queue q
     JOIN dispatch d ON d.id = q.dispatch_id
     WHERE d.timestamp >= ?1
     GROUP BY q.consumer_id";

pub(crate) const SELECT_CONSUMERS: &str = "SELECT DISTINCT consumer_id FROM queue";

/// Pending batch query with `excluded` placeholders for in-flight ids
///
/// Parameters: `?1` consumer, `?2` timestamp floor, then the excluded ids, then the limit.
pub(crate) fn select_pending_batch(excluded: usize) -> String {
    let mut sql = String::from(
        "SELECT d.id, d.timestamp, d.payload FROM dispatch d
         JOIN queue q ON q.dispatch_id = d.id
         WHERE q.consumer_id = ?1 AND d.timestamp >= ?2",
    );
    if excluded > 0 {
        let placeholders = (0..excluded)
            .map(|i| format!("?{}", i + 3))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" AND d.id NOT IN ({placeholders})"));
    }
    sql.push_str(&format!(
        " ORDER BY d.timestamp ASC, d.rowid ASC LIMIT ?{}",
        excluded + 3
    ));
    sql
}

/// Delete queue rows of consumers outside the active set
///
/// Parameters: the active consumer ids.
pub(crate) fn delete_queues_not_in(active: usize) -> String {
    if active == 0 {
        return "DELETE FROM queue".to_string();
    }
    let placeholders = (0..active)
        .map(|i| format!("?{}", i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    format!("DELETE FROM queue WHERE consumer_id NOT IN ({placeholders})")
}

pub(crate) const MIGRATE_LEGACY_DISPATCHES: &str = "INSERT OR IGNORE INTO dispatch (id, timestamp, payload)
     SELECT key, timestamp, value FROM dispatches
     WHERE timestamp > ?1 AND key IS NOT NULL AND value IS NOT NULL";

pub(crate) const MIGRATE_LEGACY_QUEUE: &str = "INSERT OR IGNORE INTO queue (dispatch_id, consumer_id)
     SELECT key, ?2 FROM dispatches
     WHERE timestamp > ?1 AND key IS NOT NULL AND value IS NOT NULL";

pub(crate) const DROP_LEGACY_DISPATCHES: &str = "DROP TABLE IF EXISTS dispatches";

/// Apply connection pragmas and create the tables
pub(crate) fn initialize(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", true)?;
    // `journal_mode` returns a row, so it can't go through execute_batch
    let _mode: Option<String> = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .optional()?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.execute_batch(CREATE_TABLES)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Whether the pre-queue single table is still present
pub(crate) fn has_legacy_table(conn: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [LEGACY_DISPATCHES_TABLE],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
