//! Dispatch - one tracked event
//!
//! Created once per `track` call, never mutated after it has been persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque key/value payload of a Dispatch
pub type Payload = serde_json::Map<String, Value>;

/// Payload key holding the event name
pub const KEY_EVENT_NAME: &str = "event_name";
/// Payload key holding the dispatch id
pub const KEY_DISPATCH_ID: &str = "dispatch_id";
/// Payload key holding the unix timestamp in milliseconds
pub const KEY_TIMESTAMP_MS: &str = "timestamp_ms";
/// Payload key holding the RFC 3339 timestamp
pub const KEY_TIMESTAMP_ISO: &str = "timestamp_iso";
/// Payload key holding the per-instance event sequence number
pub const KEY_EVENT_SEQUENCE: &str = "event_sequence";

/// A persisted, immutable event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dispatch {
    /// Unique id (upsert key in the store)
    pub id: String,

    /// Unix timestamp in milliseconds, used for FIFO ordering and expiry
    pub timestamp: i64,

    /// Serialized key/value document
    pub payload: Payload,
}

impl Dispatch {
    /// Create a Dispatch
    pub fn new(id: impl Into<String>, timestamp: i64, payload: Payload) -> Self {
        Self {
            id: id.into(),
            timestamp,
            payload,
        }
    }

    /// Event name, if the payload carries one
    pub fn event_name(&self) -> Option<&str> {
        self.payload.get(KEY_EVENT_NAME).and_then(Value::as_str)
    }

    /// Payload as a JSON document (storage format)
    pub fn payload_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.payload)
    }

    /// Rebuild a Dispatch from its stored columns
    pub fn from_stored(
        id: impl Into<String>,
        timestamp: i64,
        payload_json: &str,
    ) -> Result<Self, serde_json::Error> {
        let payload: Payload = serde_json::from_str(payload_json)?;
        Ok(Self::new(id, timestamp, payload))
    }
}

/// Ids of a batch, in batch order
pub fn dispatch_ids(dispatches: &[Dispatch]) -> Vec<String> {
    dispatches.iter().map(|d| d.id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stored_payload_round_trip() {
        let mut payload = Payload::new();
        payload.insert(KEY_EVENT_NAME.into(), json!("screen_view"));
        payload.insert("screen".into(), json!({ "name": "home", "depth": 2 }));
        let dispatch = Dispatch::new("abc", 1_700_000_000_000, payload);

        let stored = dispatch.payload_json().unwrap();
        let restored = Dispatch::from_stored("abc", 1_700_000_000_000, &stored).unwrap();

        assert_eq!(restored, dispatch);
        assert_eq!(restored.event_name(), Some("screen_view"));
    }

    #[test]
    fn test_from_stored_rejects_non_object() {
        assert!(Dispatch::from_stored("x", 1, "[1, 2]").is_err());
    }
}
