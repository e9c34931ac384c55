//! Drain loop metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single consumer's drain loop
#[derive(Debug, Default)]
pub struct DrainMetrics {
    /// Dispatches currently in flight
    in_flight: AtomicUsize,
    /// Total dispatch attempts (batches handed to the dispatcher)
    attempts: AtomicU64,
    /// Total acknowledged Dispatches
    delivered: AtomicU64,
    /// Total failed acknowledgements
    ack_failures: AtomicU64,
    /// Dispatches handed back undelivered by the dispatcher
    released: AtomicU64,
}

impl DrainMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn set_in_flight(&self, count: usize) {
        self.in_flight.store(count, Ordering::Relaxed);
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    pub fn inc_attempts(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn add_delivered(&self, count: usize) {
        self.delivered.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn ack_failures(&self) -> u64 {
        self.ack_failures.load(Ordering::Relaxed)
    }

    pub fn inc_ack_failures(&self) {
        self.ack_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn add_released(&self, count: usize) {
        self.released.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            in_flight: self.in_flight(),
            attempts: self.attempts(),
            delivered: self.delivered(),
            ack_failures: self.ack_failures(),
            released: self.released(),
        }
    }
}

/// Snapshot of drain metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub in_flight: usize,
    pub attempts: u64,
    pub delivered: u64,
    pub ack_failures: u64,
    pub released: u64,
}
