//! Session statistics.

use std::time::Duration;

use observability::MetricsSummary;

/// Statistics from a tracking session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Input lines read
    pub lines_read: u64,

    /// Events persisted
    pub events_tracked: u64,

    /// Events dropped (no consumer enabled)
    pub events_dropped: u64,

    /// Lines that were not valid events
    pub events_rejected: u64,

    /// Dispatches still queued at the end
    pub pending_at_exit: usize,

    /// Total duration of the session
    pub duration: Duration,

    /// Delivery statistics from the drain loops
    pub delivery: MetricsSummary,
}

impl SessionStats {
    /// Tracked events per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_tracked as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Session Statistics ===\n");
        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Events tracked: {}", self.events_tracked);
        println!("   ├─ Events dropped: {}", self.events_dropped);
        println!("   ├─ Events rejected: {}", self.events_rejected);
        println!("   ├─ Events/s: {:.2}", self.events_per_sec());
        println!("   └─ Pending at exit: {}", self.pending_at_exit);
        println!();
        print!("{}", self.delivery);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_per_sec() {
        let stats = SessionStats {
            events_tracked: 50,
            duration: Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(stats.events_per_sec(), 25.0);
        assert_eq!(SessionStats::default().events_per_sec(), 0.0);
    }
}
