//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置到 Tracker 的完整启动路径
//! - 入队、barrier 开关、投递与确认的端到端流程
//! - 容量淘汰、旧表迁移与重启后的持久化

#[cfg(test)]
mod support {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use barriers::ManualConnectivity;
    use contracts::{
        ConnectionType, ConnectivityStatus, DeliveryCallback, Dispatch, Dispatcher, Disposable,
    };

    /// Keeps every attempt so the test decides what gets acknowledged
    pub struct ManualDispatcher {
        id: String,
        limit: usize,
        attempts: Arc<Mutex<Vec<(Vec<Dispatch>, DeliveryCallback)>>>,
    }

    impl ManualDispatcher {
        pub fn new(id: &str, limit: usize) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                limit,
                attempts: Arc::new(Mutex::new(Vec::new())),
            })
        }

        pub fn received(&self) -> Vec<Dispatch> {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(batch, _)| batch.clone())
                .collect()
        }

        pub fn attempt_count(&self) -> usize {
            self.attempts.lock().unwrap().len()
        }

        /// Acknowledge the whole `index`-th attempt
        pub fn ack(&self, index: usize) {
            let attempts = self.attempts.lock().unwrap();
            let (batch, callback) = &attempts[index];
            callback.delivered(batch.clone());
        }
    }

    impl Dispatcher for ManualDispatcher {
        fn id(&self) -> &str {
            &self.id
        }

        fn dispatch_limit(&self) -> usize {
            self.limit
        }

        fn dispatch(&self, batch: Vec<Dispatch>, callback: DeliveryCallback) -> Disposable {
            self.attempts.lock().unwrap().push((batch, callback));
            Disposable::noop()
        }
    }

    /// Acknowledges every batch immediately
    pub struct AckingDispatcher {
        id: String,
        limit: usize,
        received: Arc<Mutex<Vec<Vec<Dispatch>>>>,
    }

    impl AckingDispatcher {
        pub fn new(id: &str, limit: usize) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                limit,
                received: Arc::new(Mutex::new(Vec::new())),
            })
        }

        pub fn batches(&self) -> Vec<Vec<Dispatch>> {
            self.received.lock().unwrap().clone()
        }
    }

    impl Dispatcher for AckingDispatcher {
        fn id(&self) -> &str {
            &self.id
        }

        fn dispatch_limit(&self) -> usize {
            self.limit
        }

        fn dispatch(&self, batch: Vec<Dispatch>, callback: DeliveryCallback) -> Disposable {
            self.received.lock().unwrap().push(batch.clone());
            callback.delivered(batch);
            Disposable::noop()
        }
    }

    pub fn wifi() -> Arc<ManualConnectivity> {
        Arc::new(ManualConnectivity::with_status(ConnectivityStatus::Connected(
            ConnectionType::Wifi,
        )))
    }

    /// Poll `condition` until it holds or two seconds pass
    pub async fn eventually<F>(mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Let spawned tasks run without expecting anything to happen
    pub async fn settle() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_blueprint_from_loader() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[[dispatchers]]
name = "collect"
kind = "collect"
dispatch_limit = 10
[dispatchers.params]
addr = "127.0.0.1:9999"
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        assert_eq!(blueprint.version, contracts::ConfigVersion::V1);
        assert_eq!(blueprint.dispatcher_names(), vec!["collect"]);
        assert_eq!(blueprint.store.max_queue_size, 100);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;

    use barriers::{AlwaysConnected, BatchingBarrier};
    use contracts::{BarrierScope, BarrierSettings, BarrierState, Dispatcher, Payload};
    use dispatch_store::{now_millis, DispatchStore, StoreOptions};
    use serde_json::json;
    use tracker::{Tracker, TrackerOptions};

    use crate::support::{eventually, settle, wifi, AckingDispatcher, ManualDispatcher};

    fn batching(batch_size: usize, consumer: &str) -> HashMap<String, BarrierSettings> {
        let mut configuration = serde_json::Map::new();
        configuration.insert(BatchingBarrier::KEY_BATCH_SIZE.into(), json!(batch_size));
        HashMap::from([(
            BatchingBarrier::ID.to_string(),
            BarrierSettings {
                scopes: Some(HashSet::from([BarrierScope::consumer(consumer)])),
                configuration,
            },
        )])
    }

    /// Limit 1: one event opens the gate, is delivered alone and the gate closes again
    #[tokio::test]
    async fn test_single_event_opens_delivers_and_closes() {
        let collect = AckingDispatcher::new("collect", 1);
        let store = DispatchStore::open_in_memory(StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions::default(),
        )
        .await
        .unwrap();
        let gate = tracker.registry().on_barriers_state("collect");

        tracker.track("launch", Payload::new()).await.unwrap();

        assert!(eventually(|| collect.batches().len() == 1).await);
        assert_eq!(collect.batches()[0].len(), 1);
        let store = tracker.store().clone();
        assert!(eventually(|| store.snapshot().pending("collect") == 0).await);
        assert!(
            eventually(|| gate.latest() == Some(BarrierState::Closed)).await,
            "gate should close once the queue is empty"
        );
        assert_eq!(tracker.store().size().await.unwrap(), 0);

        tracker.shutdown().await;
    }

    /// Partial acknowledgement keeps the rest queued and the gate open
    #[tokio::test]
    async fn test_partial_ack_keeps_remaining_pending() {
        let collect = ManualDispatcher::new("collect", 1);
        let store = DispatchStore::open_in_memory(StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions::default(),
        )
        .await
        .unwrap();
        let gate = tracker.registry().on_barriers_state("collect");

        for name in ["a", "b", "c"] {
            tracker.track(name, Payload::new()).await.unwrap();
        }
        assert!(eventually(|| collect.attempt_count() == 3).await);

        collect.ack(0);
        let store = tracker.store().clone();
        assert!(eventually(|| store.snapshot().pending("collect") == 2).await);
        assert_eq!(tracker.pending_count("collect").await.unwrap(), 2);
        assert!(eventually(|| gate.latest() == Some(BarrierState::Open)).await);

        // In-flight ids are never handed out twice
        settle().await;
        let mut ids: Vec<String> = collect.received().into_iter().map(|d| d.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);

        tracker.shutdown().await;
    }

    /// Every enabled consumer receives every event; acks are independent
    #[tokio::test]
    async fn test_fan_out_to_independent_consumers() {
        let collect = ManualDispatcher::new("collect", 10);
        let logger = AckingDispatcher::new("logger", 10);
        let store = DispatchStore::open_in_memory(StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![
                collect.clone() as Arc<dyn Dispatcher>,
                logger.clone() as Arc<dyn Dispatcher>,
            ],
            TrackerOptions {
                barriers: batching(1, "collect"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        tracker.track("launch", Payload::new()).await.unwrap();

        let store = tracker.store().clone();
        assert!(
            eventually(|| !logger.batches().is_empty() && store.snapshot().pending("logger") == 0)
                .await
        );
        assert!(eventually(|| collect.attempt_count() == 1).await);
        // Row stays while collect still owes an ack
        assert_eq!(tracker.store().size().await.unwrap(), 1);

        collect.ack(0);
        assert!(eventually(|| store.snapshot().pending("collect") == 0).await);
        assert_eq!(tracker.store().size().await.unwrap(), 0);

        tracker.shutdown().await;
    }

    /// A full queue drops the globally oldest Dispatch
    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let collect = ManualDispatcher::new("collect", 10);
        let store = DispatchStore::open_in_memory(StoreOptions {
            max_queue_size: 2,
            ..Default::default()
        })
        .unwrap();
        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions {
                barriers: batching(10, "collect"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let mut ids = Vec::new();
        for name in ["first", "second", "third"] {
            match tracker.track(name, Payload::new()).await.unwrap() {
                tracker::TrackResult::Accepted { dispatch_id, .. } => ids.push(dispatch_id),
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(tracker.store().size().await.unwrap(), 2);
        let remaining = tracker
            .store()
            .pending_batch("collect", HashSet::new(), 10, i64::MIN)
            .await
            .unwrap();
        let remaining: Vec<String> = remaining.into_iter().map(|d| d.id).collect();
        assert_eq!(remaining, vec![ids[1].clone(), ids[2].clone()]);

        // Batch size 10 never reached
        settle().await;
        assert_eq!(collect.attempt_count(), 0);

        tracker.shutdown().await;
    }

    /// Lowering the batch size releases what is already queued
    #[tokio::test]
    async fn test_batch_size_change_reopens_gate() {
        let collect = AckingDispatcher::new("collect", 10);
        let store = DispatchStore::open_in_memory(StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions {
                barriers: batching(3, "collect"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        tracker.track("a", Payload::new()).await.unwrap();
        tracker.track("b", Payload::new()).await.unwrap();
        settle().await;
        assert!(collect.batches().is_empty());

        tracker.update_barrier_settings(batching(2, "collect"));

        assert!(eventually(|| collect.batches().len() == 1).await);
        assert_eq!(collect.batches()[0].len(), 2);
        let store = tracker.store().clone();
        assert!(eventually(|| store.snapshot().pending("collect") == 0).await);

        tracker.shutdown().await;
    }

    /// Rows of the pre-queue single table reach the consumers after an upgrade
    #[tokio::test]
    async fn test_legacy_rows_migrate_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.db");
        let now = now_millis();
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE dispatches (key TEXT PRIMARY KEY, timestamp INTEGER, value TEXT);",
            )
            .unwrap();
            for (key, age) in [("old-1", 2_000), ("old-2", 1_000)] {
                conn.execute(
                    "INSERT INTO dispatches (key, timestamp, value) VALUES (?1, ?2, ?3)",
                    rusqlite::params![key, now - age, r#"{"event_name":"legacy"}"#],
                )
                .unwrap();
            }
        }

        let collect = AckingDispatcher::new("collect", 10);
        let store = DispatchStore::open(&path, StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            Arc::new(AlwaysConnected::new()),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions {
                barriers: batching(2, "collect"),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert!(eventually(|| collect.batches().len() == 1).await);
        let ids: Vec<String> = collect.batches()[0].iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["old-1".to_string(), "old-2".to_string()]);
        assert_eq!(collect.batches()[0][0].payload["event_name"], "legacy");

        tracker.shutdown().await;
    }

    /// Queued Dispatches survive a restart and are delivered afterwards
    #[tokio::test]
    async fn test_queue_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.db");

        {
            let holding = ManualDispatcher::new("collect", 1);
            let store = DispatchStore::open(&path, StoreOptions::default()).unwrap();
            let tracker = Tracker::with_parts(
                store,
                wifi(),
                vec![holding.clone() as Arc<dyn Dispatcher>],
                TrackerOptions::default(),
            )
            .await
            .unwrap();

            tracker.track("launch", Payload::new()).await.unwrap();
            tracker.track("purchase", Payload::new()).await.unwrap();
            assert!(eventually(|| holding.received().len() == 2).await);

            // Never acknowledged
            tracker.shutdown().await;
        }

        let collect = AckingDispatcher::new("collect", 1);
        let store = DispatchStore::open(&path, StoreOptions::default()).unwrap();
        assert_eq!(store.pending_count("collect").await.unwrap(), 2);

        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions::default(),
        )
        .await
        .unwrap();

        assert!(eventually(|| collect.batches().iter().map(Vec::len).sum::<usize>() == 2).await);
        let names: Vec<String> = collect
            .batches()
            .concat()
            .iter()
            .filter_map(|d| d.event_name().map(str::to_string))
            .collect();
        assert_eq!(names, vec!["launch".to_string(), "purchase".to_string()]);

        tracker.shutdown().await;
    }

    /// A refused acknowledgement leaves the Dispatch queued for the next drain
    #[tokio::test]
    async fn test_failed_acknowledgement_is_redelivered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beacon.db");

        let collect = ManualDispatcher::new("collect", 1);
        let store = DispatchStore::open(&path, StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            wifi(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions::default(),
        )
        .await
        .unwrap();

        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.busy_timeout(std::time::Duration::from_secs(1)).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER refuse_acks BEFORE DELETE ON queue
             BEGIN SELECT RAISE(ABORT, 'acknowledgement refused'); END;",
        )
        .unwrap();

        tracker.track("launch", Payload::new()).await.unwrap();
        assert!(eventually(|| collect.attempt_count() == 1).await);
        collect.ack(0);

        let failed = || {
            tracker
                .metrics()
                .into_iter()
                .any(|(id, m)| id == "collect" && m.ack_failures == 1 && m.in_flight == 0)
        };
        assert!(eventually(failed).await);
        assert_eq!(tracker.pending_count("collect").await.unwrap(), 1);
        assert_eq!(tracker.store().size().await.unwrap(), 1);

        // Nothing is retried until the next drain trigger
        settle().await;
        assert_eq!(collect.attempt_count(), 1);

        conn.execute_batch("DROP TRIGGER refuse_acks;").unwrap();
        tracker.track("purchase", Payload::new()).await.unwrap();

        assert!(eventually(|| collect.attempt_count() == 3).await);
        let received: Vec<String> = collect.received().into_iter().map(|d| d.id).collect();
        assert_eq!(received[0], received[1]);
        assert_ne!(received[1], received[2]);

        collect.ack(1);
        collect.ack(2);
        let store = tracker.store().clone();
        assert!(eventually(|| store.snapshot().pending("collect") == 0).await);
        assert_eq!(tracker.summary().total_ack_failures, 1);

        tracker.shutdown().await;
    }

    /// Losing the connection holds delivery until it returns
    #[tokio::test]
    async fn test_connectivity_loss_holds_delivery() {
        let connectivity = wifi();
        let collect = AckingDispatcher::new("collect", 1);
        let store = DispatchStore::open_in_memory(StoreOptions::default()).unwrap();
        let tracker = Tracker::with_parts(
            store,
            connectivity.clone(),
            vec![collect.clone() as Arc<dyn Dispatcher>],
            TrackerOptions::default(),
        )
        .await
        .unwrap();

        connectivity.set(contracts::ConnectivityStatus::NotConnected);
        settle().await;
        tracker.track("offline", Payload::new()).await.unwrap();
        settle().await;
        assert!(collect.batches().is_empty());

        connectivity.set(contracts::ConnectivityStatus::Connected(
            contracts::ConnectionType::Cellular,
        ));
        assert!(eventually(|| collect.batches().len() == 1).await);

        tracker.shutdown().await;
    }
}
