//! BatchingBarrier - opens once enough Dispatches are pending
//!
//! Threshold for a consumer is `min(batch_size, dispatch_limit)` when a batch size
//! is configured, its `dispatch_limit` otherwise. Both inputs are live: changing the
//! configuration or the consumer set re-evaluates immediately, without waiting for
//! the queue to change.

use std::collections::HashSet;
use std::sync::Arc;

use contracts::{
    Barrier, BarrierConfiguration, BarrierContext, BarrierFactory, BarrierScope, BarrierState,
    ConsumerInfo, QueueMetrics, StateCell, StateStream,
};
use serde_json::Value;
use tracing::debug;

/// Threshold used for consumers that are not registered
const DEFAULT_BATCH_SIZE: usize = 1;

pub struct BatchingBarrier {
    queue_metrics: Arc<dyn QueueMetrics>,
    consumers: StateStream<Vec<ConsumerInfo>>,
    batch_size: StateCell<Option<usize>>,
}

impl BatchingBarrier {
    pub const ID: &'static str = "BatchingBarrier";
    pub const KEY_BATCH_SIZE: &'static str = "batch_size";

    pub fn new(
        queue_metrics: Arc<dyn QueueMetrics>,
        consumers: StateStream<Vec<ConsumerInfo>>,
        batch_size: Option<usize>,
    ) -> Self {
        Self {
            queue_metrics,
            consumers,
            batch_size: StateCell::new(batch_size.map(|size| size.max(1))),
        }
    }

    /// Currently configured batch size
    pub fn batch_size(&self) -> Option<usize> {
        self.batch_size.get().flatten()
    }

    /// Change the batch size (`None` = follow each consumer's dispatch limit)
    pub fn set_batch_size(&self, batch_size: Option<usize>) {
        let batch_size = batch_size.map(|size| size.max(1));
        if self.batch_size.set(batch_size) {
            debug!(batch_size = ?batch_size, "batch size changed");
        }
    }
}

impl Barrier for BatchingBarrier {
    fn id(&self) -> &str {
        Self::ID
    }

    fn on_state(&self, consumer_id: &str) -> StateStream<BarrierState> {
        let consumer = consumer_id.to_string();
        let threshold = self
            .batch_size
            .subscribe()
            .combine(self.consumers.clone(), move |batch_size, consumers| {
                threshold(*batch_size, consumers, &consumer)
            });

        self.queue_metrics
            .pending_count(consumer_id)
            .combine(threshold, |pending, threshold| {
                BarrierState::from_open(*pending >= *threshold)
            })
    }

    fn update_configuration(&self, configuration: &BarrierConfiguration) {
        self.set_batch_size(batch_size_from(configuration));
    }
}

/// Required pending count for `consumer_id`
fn threshold(batch_size: Option<usize>, consumers: &[ConsumerInfo], consumer_id: &str) -> usize {
    let Some(limit) = consumers
        .iter()
        .find(|consumer| consumer.id == consumer_id)
        .map(|consumer| consumer.dispatch_limit.max(1))
    else {
        return DEFAULT_BATCH_SIZE;
    };

    match batch_size {
        Some(size) => size.clamp(1, limit),
        None => limit,
    }
}

/// `batch_size` from a configuration document; values <= 0 become 1
fn batch_size_from(configuration: &BarrierConfiguration) -> Option<usize> {
    match configuration.get(BatchingBarrier::KEY_BATCH_SIZE) {
        Some(Value::Number(number)) => number
            .as_i64()
            .map(|size| size.max(1) as usize)
            .or_else(|| number.as_u64().map(|size| size.max(1) as usize)),
        _ => None,
    }
}

/// Creates [`BatchingBarrier`]s
#[derive(Debug, Clone, Default)]
pub struct BatchingBarrierFactory {
    default_scopes: Option<HashSet<BarrierScope>>,
}

impl BatchingBarrierFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the scopes used when configuration assigns none
    pub fn with_default_scopes(scopes: HashSet<BarrierScope>) -> Self {
        Self {
            default_scopes: Some(scopes),
        }
    }
}

impl BarrierFactory for BatchingBarrierFactory {
    fn id(&self) -> &str {
        BatchingBarrier::ID
    }

    fn default_scopes(&self) -> HashSet<BarrierScope> {
        self.default_scopes
            .clone()
            .unwrap_or_else(|| HashSet::from([BarrierScope::All]))
    }

    fn create(
        &self,
        context: &BarrierContext,
        configuration: &BarrierConfiguration,
    ) -> Arc<dyn Barrier> {
        Arc::new(BatchingBarrier::new(
            Arc::clone(&context.queue_metrics),
            context.consumers.clone(),
            batch_size_from(configuration),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Pending counts driven by hand
    #[derive(Default)]
    struct FakeQueueMetrics {
        cells: Mutex<HashMap<String, StateCell<usize>>>,
    }

    impl FakeQueueMetrics {
        fn set(&self, consumer_id: &str, pending: usize) {
            let mut cells = self.cells.lock().unwrap();
            match cells.get(consumer_id) {
                Some(cell) => {
                    cell.set(pending);
                }
                None => {
                    cells.insert(consumer_id.to_string(), StateCell::new(pending));
                }
            }
        }
    }

    impl QueueMetrics for FakeQueueMetrics {
        fn pending_count(&self, consumer_id: &str) -> StateStream<usize> {
            let mut cells = self.cells.lock().unwrap();
            cells
                .entry(consumer_id.to_string())
                .or_insert_with(|| StateCell::new(0))
                .subscribe()
        }
    }

    struct Fixture {
        metrics: Arc<FakeQueueMetrics>,
        consumers: StateCell<Vec<ConsumerInfo>>,
    }

    impl Fixture {
        fn new(dispatch_limit: usize) -> Self {
            Self {
                metrics: Arc::new(FakeQueueMetrics::default()),
                consumers: StateCell::new(vec![ConsumerInfo::new("collect", dispatch_limit)]),
            }
        }

        fn barrier(&self, batch_size: Option<usize>) -> BatchingBarrier {
            BatchingBarrier::new(
                self.metrics.clone(),
                self.consumers.subscribe(),
                batch_size,
            )
        }
    }

    async fn next_state(stream: &mut StateStream<BarrierState>) -> BarrierState {
        timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("barrier did not emit")
            .expect("barrier stream ended")
    }

    #[test]
    fn test_threshold_rules() {
        let consumers = vec![ConsumerInfo::new("collect", 2)];
        assert_eq!(threshold(None, &consumers, "collect"), 2);
        assert_eq!(threshold(Some(1), &consumers, "collect"), 1);
        assert_eq!(threshold(Some(10), &consumers, "collect"), 2);
        assert_eq!(threshold(Some(10), &consumers, "unknown"), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_batch_size_coerced_to_at_least_one() {
        let mut configuration = BarrierConfiguration::new();
        configuration.insert("batch_size".into(), json!(-3));
        assert_eq!(batch_size_from(&configuration), Some(1));

        configuration.insert("batch_size".into(), json!(0));
        assert_eq!(batch_size_from(&configuration), Some(1));

        configuration.insert("batch_size".into(), json!("5"));
        assert_eq!(batch_size_from(&configuration), None);

        assert_eq!(batch_size_from(&BarrierConfiguration::new()), None);
    }

    #[tokio::test]
    async fn test_unset_batch_size_uses_dispatch_limit() {
        let fixture = Fixture::new(2);
        let barrier = fixture.barrier(None);
        fixture.metrics.set("collect", 1);

        let mut state = barrier.on_state("collect");
        assert_eq!(next_state(&mut state).await, BarrierState::Closed);

        fixture.metrics.set("collect", 2);
        assert_eq!(next_state(&mut state).await, BarrierState::Open);
    }

    #[tokio::test]
    async fn test_batch_size_below_dispatch_limit_wins() {
        let fixture = Fixture::new(2);
        let barrier = fixture.barrier(Some(1));
        fixture.metrics.set("collect", 1);

        let mut state = barrier.on_state("collect");
        assert_eq!(next_state(&mut state).await, BarrierState::Open);
    }

    #[tokio::test]
    async fn test_lowering_batch_size_opens_without_enqueue() {
        let fixture = Fixture::new(10);
        let barrier = fixture.barrier(Some(6));
        fixture.metrics.set("collect", 5);

        let mut state = barrier.on_state("collect");
        assert_eq!(next_state(&mut state).await, BarrierState::Closed);

        let mut configuration = BarrierConfiguration::new();
        configuration.insert("batch_size".into(), json!(4));
        barrier.update_configuration(&configuration);

        assert_eq!(barrier.batch_size(), Some(4));
        assert_eq!(next_state(&mut state).await, BarrierState::Open);
    }

    #[tokio::test]
    async fn test_consumer_change_reevaluates() {
        let fixture = Fixture::new(5);
        let barrier = fixture.barrier(None);
        fixture.metrics.set("collect", 3);

        let mut state = barrier.on_state("collect");
        assert_eq!(next_state(&mut state).await, BarrierState::Closed);

        fixture
            .consumers
            .set(vec![ConsumerInfo::new("collect", 3)]);
        assert_eq!(next_state(&mut state).await, BarrierState::Open);
    }

    #[tokio::test]
    async fn test_emissions_are_distinct() {
        let fixture = Fixture::new(1);
        let barrier = fixture.barrier(None);
        fixture.metrics.set("collect", 1);

        let mut state = barrier.on_state("collect");
        assert_eq!(next_state(&mut state).await, BarrierState::Open);

        fixture.metrics.set("collect", 4);
        assert!(timeout(Duration::from_millis(50), state.next())
            .await
            .is_err());
    }

    #[test]
    fn test_factory_default_scopes() {
        assert_eq!(
            BatchingBarrierFactory::new().default_scopes(),
            HashSet::from([BarrierScope::All])
        );
        let scoped =
            BatchingBarrierFactory::with_default_scopes(HashSet::from([BarrierScope::consumer("x")]));
        assert!(scoped.default_scopes().contains(&BarrierScope::consumer("x")));
    }
}
