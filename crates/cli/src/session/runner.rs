//! Session runner - coordinates tracker, input and drain.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::SdkBlueprint;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracker::{TrackResult, Tracker};

use super::{parse_event_line, SessionStats};
use crate::error::CliError;

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The SDK blueprint
    pub blueprint: SdkBlueprint,

    /// JSON-lines event file (None = stdin)
    pub input: Option<PathBuf>,

    /// How long to keep draining after the input ends
    pub drain_timeout: Duration,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// One tracking session
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Track every input event, then drain until the queue is empty or the drain
    /// timeout passes
    pub async fn run(self) -> Result<SessionStats> {
        let start_time = Instant::now();

        // Initialize Metrics (optional)
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let tracker = Tracker::start(&self.config.blueprint)
            .await
            .context("Failed to start tracker")?;

        let mut stats = match &self.config.input {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("Failed to open input {}", path.display()))?;
                feed(&tracker, BufReader::new(file)).await?
            }
            None => feed(&tracker, BufReader::new(tokio::io::stdin())).await?,
        };

        info!(
            tracked = stats.events_tracked,
            rejected = stats.events_rejected,
            "Input finished, draining"
        );
        stats.pending_at_exit = drain(&tracker, self.config.drain_timeout).await?;

        tracker.shutdown().await;
        stats.delivery = tracker.summary();
        stats.duration = start_time.elapsed();

        if stats.pending_at_exit > 0 {
            warn!(
                "{}",
                CliError::DrainIncomplete {
                    pending: stats.pending_at_exit
                }
            );
        }

        Ok(stats)
    }
}

/// Track every event line of `reader`
async fn feed<R>(tracker: &Tracker, reader: R) -> Result<SessionStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = SessionStats::default();
    let mut lines = reader.lines();
    let mut number = 0usize;

    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        number += 1;
        stats.lines_read += 1;

        let event = match parse_event_line(number, &line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Skipping line");
                stats.events_rejected += 1;
                continue;
            }
        };

        match tracker.track(&event.event, event.data).await? {
            TrackResult::Accepted { dispatch_id, .. } => {
                debug!(line = number, dispatch_id = %dispatch_id, "Tracked");
                stats.events_tracked += 1;
            }
            TrackResult::Dropped { reason } => {
                debug!(line = number, reason = %reason, "Dropped");
                stats.events_dropped += 1;
            }
        }
    }

    Ok(stats)
}

/// Wait for every consumer's queue to empty; returns what is still pending
async fn drain(tracker: &Tracker, timeout: Duration) -> Result<usize> {
    let deadline = Instant::now() + timeout;
    loop {
        let mut pending = 0;
        for consumer in tracker.coordinator().consumer_ids() {
            pending += tracker.pending_count(&consumer).await?;
        }
        if pending == 0 || Instant::now() >= deadline {
            return Ok(pending);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{DispatcherConfig, DispatcherKind, StoreConfig};
    use std::collections::HashMap;

    fn blueprint(store: PathBuf) -> SdkBlueprint {
        SdkBlueprint {
            version: Default::default(),
            store: StoreConfig {
                path: store,
                ..Default::default()
            },
            coordinator: Default::default(),
            connectivity: Default::default(),
            barriers: vec![],
            dispatchers: vec![DispatcherConfig {
                name: "logger".into(),
                kind: DispatcherKind::Log,
                dispatch_limit: 1,
                params: HashMap::new(),
            }],
        }
    }

    #[tokio::test]
    async fn test_session_tracks_and_drains_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("events.jsonl");
        std::fs::write(
            &input,
            "{\"event\":\"launch\"}\n\nnot json\n{\"event\":\"purchase\",\"data\":{\"amount\":2}}\n",
        )
        .unwrap();

        let session = Session::new(SessionConfig {
            blueprint: blueprint(dir.path().join("beacon.db")),
            input: Some(input),
            drain_timeout: Duration::from_secs(5),
            metrics_port: None,
        });
        let stats = session.run().await.unwrap();

        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.events_tracked, 2);
        assert_eq!(stats.events_rejected, 1);
        assert_eq!(stats.pending_at_exit, 0);
        assert_eq!(stats.delivery.total_delivered, 2);
    }
}
