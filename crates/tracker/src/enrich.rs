//! Dispatch creation: ids, timestamps and payload enrichment

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat};
use contracts::{
    Dispatch, Payload, KEY_DISPATCH_ID, KEY_EVENT_NAME, KEY_EVENT_SEQUENCE, KEY_TIMESTAMP_ISO,
    KEY_TIMESTAMP_MS,
};
use serde_json::json;
use uuid::Uuid;

/// Millisecond clock that never repeats or goes backwards
///
/// A reading equal to or below the previous one is bumped to previous + 1.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timestamp for `now_ms`, strictly greater than every earlier one
    pub fn next(&self, now_ms: i64) -> i64 {
        let previous = self
            .last
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now_ms.max(last.saturating_add(1)))
            })
            .unwrap_or_else(|last| last);
        now_ms.max(previous.saturating_add(1))
    }
}

/// Builds enriched Dispatches
#[derive(Debug, Default)]
pub struct DispatchFactory {
    clock: MonotonicClock,
    sequence: AtomicU64,
}

impl DispatchFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// New Dispatch for `event_name` at `now_ms`
    ///
    /// Enrichment keys overwrite caller-provided values of the same name.
    pub fn create(&self, event_name: &str, mut payload: Payload, now_ms: i64) -> Dispatch {
        let id = Uuid::new_v4().to_string();
        let timestamp = self.clock.next(now_ms);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        payload.insert(KEY_EVENT_NAME.into(), json!(event_name));
        payload.insert(KEY_DISPATCH_ID.into(), json!(id));
        payload.insert(KEY_TIMESTAMP_MS.into(), json!(timestamp));
        if let Some(iso) = iso_timestamp(timestamp) {
            payload.insert(KEY_TIMESTAMP_ISO.into(), json!(iso));
        }
        payload.insert(KEY_EVENT_SEQUENCE.into(), json!(sequence));

        Dispatch::new(id, timestamp, payload)
    }
}

fn iso_timestamp(timestamp_ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(timestamp_ms)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Millis, true))
}
