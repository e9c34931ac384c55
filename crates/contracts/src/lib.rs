//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Dispatch timestamps are unix milliseconds (`i64`)
//! - Timestamps order delivery (FIFO per consumer) and drive expiry

mod barrier;
mod blueprint;
mod connectivity;
mod consumer;
mod dispatch;
mod error;
mod queue_metrics;
mod stream;
mod transport;

pub use barrier::*;
pub use blueprint::*;
pub use connectivity::*;
pub use consumer::*;
pub use dispatch::*;
pub use error::*;
pub use queue_metrics::QueueMetrics;
pub use stream::{StateCell, StateStream};
pub use transport::{LocalTransport, Transport};
