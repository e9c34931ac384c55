//! # Dispatch Store
//!
//! Durable multi-consumer queue on SQLite.
//!
//! Each Dispatch is stored once and referenced by one queue entry per consumer that
//! still has to receive it. A Dispatch row exists exactly as long as at least one
//! queue entry references it.
//!
//! All reads and writes run on a single sequencer thread, so pending counts are always
//! consistent with the last committed write.

mod editor;
mod error;
mod queue;
mod schema;
mod sequencer;
mod store;

pub use editor::DispatchEditor;
pub use error::{PersistenceError, Result};
pub use queue::{EditSummary, PendingSnapshot};
pub use schema::{LEGACY_DISPATCHES_TABLE, SCHEMA_VERSION};
pub use store::{DispatchStore, StoreOptions};

/// Current unix time in milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
