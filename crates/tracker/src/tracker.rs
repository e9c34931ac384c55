//! Tracker - one SDK instance
//!
//! Owns the store, the barrier registry and the drain coordinator, and turns
//! `track` calls into persisted Dispatches for every enabled consumer.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use barriers::{connectivity_from_config, BarrierRegistry, StoreQueueMetrics};
use contracts::{
    BarrierContext, BarrierSettings, Connectivity, ConsumerInfo, Dispatcher, Payload,
    SdkBlueprint, StateCell,
};
use dispatch_store::{now_millis, DispatchStore, StoreOptions};
use dispatcher::{create_dispatchers, CoordinatorOptions, DrainCoordinator, MetricsSnapshot};
use observability::MetricsSummary;
use tracing::{debug, info, instrument};

use crate::enrich::DispatchFactory;
use crate::error::{Result, TrackerError};

/// Outcome of a `track` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackResult {
    /// Persisted for `consumers` consumers
    Accepted { dispatch_id: String, consumers: usize },
    /// Not persisted
    Dropped { reason: String },
}

impl TrackResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Runtime settings of a [`Tracker`] not tied to storage
#[derive(Debug, Clone, Default)]
pub struct TrackerOptions {
    pub coordinator: CoordinatorOptions,
    pub barriers: HashMap<String, BarrierSettings>,
}

/// An SDK instance
pub struct Tracker {
    store: DispatchStore,
    coordinator: DrainCoordinator,
    factory: DispatchFactory,
    _queue_metrics: Arc<StoreQueueMetrics>,
}

impl Tracker {
    /// Build an instance from a blueprint: open the store and start every dispatcher
    ///
    /// Failing to open the store is fatal.
    #[instrument(name = "tracker_start", skip(blueprint), fields(store = %blueprint.store.path.display()))]
    pub async fn start(blueprint: &SdkBlueprint) -> Result<Self> {
        let store = DispatchStore::open(&blueprint.store.path, StoreOptions::from(&blueprint.store))
            .map_err(TrackerError::Initialization)?;
        let connectivity = connectivity_from_config(&blueprint.connectivity);
        let dispatchers = create_dispatchers(&blueprint.dispatchers).await?;

        let options = TrackerOptions {
            coordinator: CoordinatorOptions::from(&blueprint.coordinator),
            barriers: blueprint.barrier_settings(),
        };
        Self::with_parts(store, connectivity, dispatchers, options).await
    }

    /// Build an instance from already created parts
    ///
    /// Queue entries of consumers not in `dispatchers` are removed (running the legacy
    /// migration on first use) and expired Dispatches are purged before any
    /// dispatcher starts.
    #[instrument(name = "tracker_with_parts", skip_all, fields(dispatchers = dispatchers.len()))]
    pub async fn with_parts(
        store: DispatchStore,
        connectivity: Arc<dyn Connectivity>,
        dispatchers: Vec<Arc<dyn Dispatcher>>,
        options: TrackerOptions,
    ) -> Result<Self> {
        let active: HashSet<String> = dispatchers.iter().map(|d| d.id().to_string()).collect();
        let stale = store
            .delete_queues_not_in(active)
            .await
            .map_err(TrackerError::Initialization)?;
        let expired = store
            .expire_stale()
            .await
            .map_err(TrackerError::Initialization)?;
        debug!(stale, expired, "Store cleaned up");

        let queue_metrics = StoreQueueMetrics::new(&store);
        let consumers: StateCell<Vec<ConsumerInfo>> = StateCell::new(Vec::new());
        let context = BarrierContext {
            queue_metrics: queue_metrics.clone(),
            connectivity,
            consumers: consumers.subscribe(),
        };
        let registry = Arc::new(BarrierRegistry::new(context, options.barriers));
        let coordinator =
            DrainCoordinator::new(store.clone(), registry, consumers, options.coordinator);

        for dispatcher in dispatchers {
            coordinator.enable(dispatcher)?;
        }
        info!(consumers = ?coordinator.consumer_ids(), "Tracker started");

        Ok(Self {
            store,
            coordinator,
            factory: DispatchFactory::new(),
            _queue_metrics: queue_metrics,
        })
    }

    /// Record one event
    #[instrument(name = "tracker_track", skip(self, payload), fields(event = %event_name))]
    pub async fn track(&self, event_name: &str, payload: Payload) -> Result<TrackResult> {
        if event_name.trim().is_empty() {
            return Err(TrackerError::InvalidEvent("event name is empty".into()));
        }

        let consumers = self.coordinator.consumer_ids();
        if consumers.is_empty() {
            debug!(event = %event_name, "No consumer enabled, event dropped");
            return Ok(TrackResult::Dropped {
                reason: "no consumer enabled".into(),
            });
        }

        let dispatch = self.factory.create(event_name, payload, now_millis());
        let dispatch_id = dispatch.id.clone();
        self.store.enqueue(dispatch, &consumers).await?;
        debug!(event = %event_name, dispatch_id = %dispatch_id, consumers = consumers.len(), "Event queued");

        Ok(TrackResult::Accepted {
            dispatch_id,
            consumers: consumers.len(),
        })
    }

    /// Start draining for another dispatcher
    pub fn enable_dispatcher(&self, dispatcher: Arc<dyn Dispatcher>) -> Result<()> {
        Ok(self.coordinator.enable(dispatcher)?)
    }

    /// Stop draining for `consumer_id`, dropping its queue entries
    pub async fn disable_dispatcher(&self, consumer_id: &str) -> Result<Option<usize>> {
        Ok(self.coordinator.disable(consumer_id).await?)
    }

    /// Apply new barrier settings
    pub fn update_barrier_settings(&self, settings: HashMap<String, BarrierSettings>) {
        self.coordinator.registry().update_settings(settings);
    }

    pub fn registry(&self) -> &Arc<BarrierRegistry> {
        self.coordinator.registry()
    }

    pub fn store(&self) -> &DispatchStore {
        &self.store
    }

    pub fn coordinator(&self) -> &DrainCoordinator {
        &self.coordinator
    }

    /// Pending Dispatches for `consumer_id` within the expiry window
    pub async fn pending_count(&self, consumer_id: &str) -> Result<usize> {
        let floor = now_millis().saturating_sub(
            i64::try_from(self.store.options().await?.expiration.as_millis()).unwrap_or(i64::MAX),
        );
        Ok(self.store.pending_count_since(consumer_id, floor).await?)
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.coordinator.metrics()
    }

    pub fn summary(&self) -> MetricsSummary {
        self.coordinator.summary()
    }

    /// Stop every drain loop; queued Dispatches stay in the store
    #[instrument(name = "tracker_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        self.coordinator.shutdown().await;
        info!("Tracker stopped");
    }
}
