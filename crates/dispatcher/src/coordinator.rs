//! DrainCoordinator - runs one drain loop per enabled consumer

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use barriers::BarrierRegistry;
use contracts::{ConsumerInfo, CoordinatorConfig, Dispatcher, StateCell};
use dispatch_store::DispatchStore;
use observability::{DrainStatsAggregator, MetricsSummary};
use tracing::{info, instrument};

use crate::drain::{DrainContext, DrainHandle};
use crate::error::DispatcherError;
use crate::metrics::MetricsSnapshot;

/// Coordinator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Maximum Dispatches in flight per consumer
    pub max_in_flight: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self { max_in_flight: 50 }
    }
}

impl From<&CoordinatorConfig> for CoordinatorOptions {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            max_in_flight: config.max_in_flight,
        }
    }
}

/// Drives delivery for every enabled consumer
///
/// The set of enabled consumers is published through the `consumers` cell handed to
/// [`DrainCoordinator::new`]; the same cell's stream belongs in the
/// [`contracts::BarrierContext`] the registry was built with, so batching thresholds
/// follow consumers being enabled and disabled.
pub struct DrainCoordinator {
    store: DispatchStore,
    registry: Arc<BarrierRegistry>,
    options: CoordinatorOptions,
    consumers: StateCell<Vec<ConsumerInfo>>,
    handles: Mutex<HashMap<String, DrainHandle>>,
    stats: Arc<Mutex<DrainStatsAggregator>>,
}

impl DrainCoordinator {
    pub fn new(
        store: DispatchStore,
        registry: Arc<BarrierRegistry>,
        consumers: StateCell<Vec<ConsumerInfo>>,
        options: CoordinatorOptions,
    ) -> Self {
        consumers.set(Vec::new());
        Self {
            store,
            registry,
            options,
            consumers,
            handles: Mutex::new(HashMap::new()),
            stats: Arc::new(Mutex::new(DrainStatsAggregator::new())),
        }
    }

    pub fn registry(&self) -> &Arc<BarrierRegistry> {
        &self.registry
    }

    pub fn options(&self) -> CoordinatorOptions {
        self.options
    }

    /// Start draining for `dispatcher`
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(name = "coordinator_enable", skip(self, dispatcher), fields(consumer = %dispatcher.id()))]
    pub fn enable(&self, dispatcher: Arc<dyn Dispatcher>) -> Result<(), DispatcherError> {
        let id = dispatcher.id().to_string();
        let mut handles = self.lock_handles();
        if handles.contains_key(&id) {
            return Err(DispatcherError::AlreadyEnabled(id));
        }

        // Publish first so the batching threshold knows the consumer's limit
        let info = ConsumerInfo::of(dispatcher.as_ref());
        self.consumers.update(|current| {
            let mut next: Vec<ConsumerInfo> = current.cloned().unwrap_or_default();
            next.retain(|c| c.id != info.id);
            next.push(info.clone());
            next
        });

        let context = DrainContext {
            gate: self.registry.on_barriers_state(&id),
            dispatcher,
            store: self.store.clone(),
            max_in_flight: self.options.max_in_flight,
            stats: Arc::clone(&self.stats),
        };
        handles.insert(id.clone(), DrainHandle::spawn(context));
        info!(consumer = %id, "Consumer enabled");
        Ok(())
    }

    /// Stop draining for `consumer_id` and drop its queue entries
    ///
    /// In-flight attempts are disposed. Returns the number of queue entries removed,
    /// or `None` when the consumer was not enabled.
    #[instrument(name = "coordinator_disable", skip(self))]
    pub async fn disable(&self, consumer_id: &str) -> Result<Option<usize>, DispatcherError> {
        let Some(handle) = self.lock_handles().remove(consumer_id) else {
            return Ok(None);
        };
        handle.shutdown().await;
        self.unpublish(consumer_id);

        let removed = self.store.reset_consumer(consumer_id).await?;
        info!(consumer = %consumer_id, removed, "Consumer disabled");
        Ok(Some(removed))
    }

    /// Stop every drain loop, leaving queued Dispatches in place
    #[instrument(name = "coordinator_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let handles: Vec<DrainHandle> = self.lock_handles().drain().map(|(_, h)| h).collect();
        info!(consumers = handles.len(), "DrainCoordinator shutting down");
        for handle in handles {
            let id = handle.info().id.clone();
            handle.shutdown().await;
            self.unpublish(&id);
        }
        info!("DrainCoordinator shutdown complete");
    }

    pub fn is_enabled(&self, consumer_id: &str) -> bool {
        self.lock_handles().contains_key(consumer_id)
    }

    /// Currently enabled consumers
    pub fn consumers(&self) -> Vec<ConsumerInfo> {
        self.consumers.get().unwrap_or_default()
    }

    /// Ids of the currently enabled consumers
    pub fn consumer_ids(&self) -> HashSet<String> {
        self.consumers().into_iter().map(|c| c.id).collect()
    }

    /// Get drain metrics for all consumers
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        let mut metrics: Vec<_> = self
            .lock_handles()
            .iter()
            .map(|(id, h)| (id.clone(), h.metrics().snapshot()))
            .collect();
        metrics.sort_by(|a, b| a.0.cmp(&b.0));
        metrics
    }

    /// Aggregated delivery statistics since start
    pub fn summary(&self) -> MetricsSummary {
        self.stats
            .lock()
            .map(|stats| stats.summary())
            .unwrap_or_default()
    }

    fn unpublish(&self, consumer_id: &str) {
        self.consumers.update(|current| {
            current
                .map(|consumers| {
                    consumers
                        .iter()
                        .filter(|c| c.id != consumer_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        });
    }

    fn lock_handles(&self) -> MutexGuard<'_, HashMap<String, DrainHandle>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
