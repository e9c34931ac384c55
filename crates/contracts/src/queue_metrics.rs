//! QueueMetrics - live pending counts per consumer

use crate::StateStream;

/// Source of per-consumer pending counts
///
/// Streams are hot: subscribers share one computation and receive the current
/// count immediately, then every change caused by enqueue, acknowledge, eviction
/// or expiry.
pub trait QueueMetrics: Send + Sync {
    /// Pending (not yet acknowledged, not expired) Dispatches for `consumer_id`
    fn pending_count(&self, consumer_id: &str) -> StateStream<usize>;
}
