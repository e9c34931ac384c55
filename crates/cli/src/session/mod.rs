//! Tracking session: feed events into a Tracker and drain them.

mod events;
mod runner;
mod stats;

pub use events::parse_event_line;
pub use runner::{Session, SessionConfig};
pub use stats::SessionStats;
