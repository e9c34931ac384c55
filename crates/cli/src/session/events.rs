//! JSON-lines event input.
//!
//! One event per line: `{"event": "name", "data": {...}}`. Blank lines are skipped.

use contracts::Payload;
use serde::Deserialize;

use crate::error::CliError;

/// One parsed input line
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventLine {
    /// Event name
    pub event: String,

    /// Event payload
    #[serde(default)]
    pub data: Payload,
}

/// Parse line `number` (1-based); `Ok(None)` for blank lines
pub fn parse_event_line(number: usize, line: &str) -> Result<Option<EventLine>, CliError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let event: EventLine =
        serde_json::from_str(line).map_err(|e| CliError::invalid_event(number, e.to_string()))?;
    if event.event.trim().is_empty() {
        return Err(CliError::invalid_event(number, "empty event name"));
    }
    Ok(Some(event))
}
