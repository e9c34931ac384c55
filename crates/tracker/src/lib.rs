//! # Tracker
//!
//! SDK facade: one [`Tracker`] is one independent SDK instance with its own store,
//! barrier registry and drain loops.
//!
//! ```no_run
//! # async fn demo(blueprint: contracts::SdkBlueprint) -> Result<(), tracker::TrackerError> {
//! let tracker = tracker::Tracker::start(&blueprint).await?;
//! tracker.track("app_launch", Default::default()).await?;
//! tracker.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod enrich;
mod error;
mod tracker;

pub use enrich::{DispatchFactory, MonotonicClock};
pub use error::{Result, TrackerError};
pub use tracker::{TrackResult, Tracker, TrackerOptions};
