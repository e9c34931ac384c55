//! DrainHandle - one consumer's drain loop running as its own task
//!
//! The loop waits for the consumer's combined barrier state to be Open, fetches the
//! oldest pending Dispatches not already in flight, hands them to the dispatcher and
//! acknowledges whatever the dispatcher reports back. Reports may cover any subset of
//! an attempt, in any number of calls. Released Dispatches are retried on the next
//! drain trigger, never on a timer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use contracts::{
    dispatch_ids, BarrierState, ConsumerInfo, DeliveryCallback, DeliveryReport, Dispatch,
    Dispatcher, Disposable, StateStream,
};
use dispatch_store::{now_millis, DispatchStore};
use observability::DrainStatsAggregator;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::DrainMetrics;

/// Everything a drain loop needs
pub(crate) struct DrainContext {
    pub dispatcher: Arc<dyn Dispatcher>,
    pub store: DispatchStore,
    pub gate: StateStream<BarrierState>,
    pub max_in_flight: usize,
    pub stats: Arc<Mutex<DrainStatsAggregator>>,
}

/// Handle to a running drain loop
pub(crate) struct DrainHandle {
    info: ConsumerInfo,
    shutdown_tx: oneshot::Sender<()>,
    metrics: Arc<DrainMetrics>,
    worker_handle: JoinHandle<()>,
}

impl DrainHandle {
    /// Spawn the drain loop for `context.dispatcher`
    pub fn spawn(context: DrainContext) -> Self {
        let info = ConsumerInfo::of(context.dispatcher.as_ref());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let metrics = Arc::new(DrainMetrics::new());

        let worker = DrainLoop::new(context, Arc::clone(&metrics));
        let worker_handle = tokio::spawn(worker.run(shutdown_rx));

        Self {
            info,
            shutdown_tx,
            metrics,
            worker_handle,
        }
    }

    pub fn info(&self) -> &ConsumerInfo {
        &self.info
    }

    pub fn metrics(&self) -> &Arc<DrainMetrics> {
        &self.metrics
    }

    /// Stop the loop and dispose every in-flight attempt
    #[instrument(name = "drain_handle_shutdown", skip(self), fields(consumer = %self.info.id))]
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.worker_handle.await {
            error!(consumer = %self.info.id, error = ?e, "Drain task panicked");
        }
        debug!(consumer = %self.info.id, "DrainHandle shutdown complete");
    }
}

/// One dispatch attempt still waiting for (part of) its acknowledgement
struct Attempt {
    pending: HashSet<String>,
    disposable: Disposable,
}

struct DrainLoop {
    consumer: String,
    dispatcher: Arc<dyn Dispatcher>,
    store: DispatchStore,
    gate: StateStream<BarrierState>,
    dispatch_limit: usize,
    max_in_flight: usize,
    metrics: Arc<DrainMetrics>,
    stats: Arc<Mutex<DrainStatsAggregator>>,
    open: bool,
    in_flight: HashSet<String>,
    attempts: HashMap<u64, Attempt>,
    next_attempt: u64,
    report_tx: mpsc::UnboundedSender<DeliveryReport>,
    report_rx: mpsc::UnboundedReceiver<DeliveryReport>,
}

impl DrainLoop {
    fn new(context: DrainContext, metrics: Arc<DrainMetrics>) -> Self {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        Self {
            consumer: context.dispatcher.id().to_string(),
            dispatch_limit: context.dispatcher.dispatch_limit().max(1),
            dispatcher: context.dispatcher,
            store: context.store,
            gate: context.gate,
            max_in_flight: context.max_in_flight.max(1),
            metrics,
            stats: context.stats,
            open: false,
            in_flight: HashSet::new(),
            attempts: HashMap::new(),
            next_attempt: 0,
            report_tx,
            report_rx,
        }
    }

    #[instrument(name = "drain_loop", skip(self, shutdown_rx), fields(consumer = %self.consumer))]
    async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) {
        info!(
            consumer = %self.consumer,
            dispatch_limit = self.dispatch_limit,
            max_in_flight = self.max_in_flight,
            "Drain loop started"
        );

        let mut snapshots = self.store.subscribe_snapshots();
        let mut last_pending = snapshots.borrow_and_update().pending(&self.consumer);
        let mut gate_done = false;
        let mut snapshots_done = false;

        loop {
            let mut should_drain = false;

            tokio::select! {
                biased;
                _ = &mut shutdown_rx => break,
                state = self.gate.next(), if !gate_done => match state {
                    Some(state) => {
                        debug!(consumer = %self.consumer, state = ?state, "Barrier state");
                        observability::record_barrier_state(&self.consumer, state);
                        self.open = state.is_open();
                        should_drain = self.open;
                    }
                    None => gate_done = true,
                },
                Some(report) = self.report_rx.recv() => {
                    should_drain = self.handle_report(report).await;
                }
                changed = snapshots.changed(), if !snapshots_done => match changed {
                    Ok(()) => {
                        let pending = snapshots.borrow_and_update().pending(&self.consumer);
                        should_drain = pending != last_pending;
                        last_pending = pending;
                    }
                    Err(_) => snapshots_done = true,
                },
            }

            if should_drain && self.open {
                self.drain().await;
            }
        }

        self.dispose_all();
        info!(consumer = %self.consumer, "Drain loop stopped");
    }

    /// Hand full batches to the dispatcher until the queue, the gate or the in-flight
    /// capacity runs out
    async fn drain(&mut self) {
        loop {
            let capacity = self.max_in_flight.saturating_sub(self.in_flight.len());
            let limit = self.dispatch_limit.min(capacity);
            if limit == 0 {
                debug!(consumer = %self.consumer, in_flight = self.in_flight.len(), "In-flight limit reached");
                return;
            }

            let batch = match self
                .store
                .next_batch(&self.consumer, self.in_flight.clone(), limit)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(consumer = %self.consumer, error = %e, "Fetching pending batch failed");
                    return;
                }
            };

            let full = batch.len() == limit;
            if !batch.is_empty() {
                self.deliver(batch);
            }
            if !full {
                return;
            }
        }
    }

    fn deliver(&mut self, batch: Vec<Dispatch>) {
        let attempt = self.next_attempt;
        self.next_attempt += 1;

        let ids: HashSet<String> = batch.iter().map(|d| d.id.clone()).collect();
        self.in_flight.extend(ids.iter().cloned());
        self.metrics.set_in_flight(self.in_flight.len());
        self.metrics.inc_attempts();
        observability::record_batch_size(&self.consumer, batch.len());
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_batch(&self.consumer, batch.len());
        }

        debug!(consumer = %self.consumer, attempt, size = batch.len(), "Dispatching batch");
        let callback = DeliveryCallback::new(attempt, self.report_tx.clone());
        let disposable = self.dispatcher.dispatch(batch, callback);

        self.attempts.insert(
            attempt,
            Attempt {
                pending: ids,
                disposable,
            },
        );
    }

    /// Apply one report; returns true when something was acknowledged
    ///
    /// Failed Dispatches and Dispatches whose acknowledgement failed leave in-flight
    /// without touching the store, so they are offered again on the next drain.
    async fn handle_report(&mut self, report: DeliveryReport) -> bool {
        let Some(attempt) = self.attempts.get_mut(&report.attempt) else {
            debug!(consumer = %self.consumer, attempt = report.attempt, "Report for finished attempt ignored");
            return false;
        };

        // Only ids still pending in this attempt; repeats and strangers are dropped
        let delivered: Vec<Dispatch> = report
            .delivered
            .into_iter()
            .filter(|d| attempt.pending.remove(&d.id))
            .collect();
        let failed: Vec<Dispatch> = report
            .failed
            .into_iter()
            .filter(|d| attempt.pending.remove(&d.id))
            .collect();
        if attempt.pending.is_empty() {
            self.attempts.remove(&report.attempt);
        }

        if !failed.is_empty() {
            warn!(
                consumer = %self.consumer,
                attempt = report.attempt,
                count = failed.len(),
                "Delivery failed, Dispatches released"
            );
            self.metrics.add_released(failed.len());
            self.release(&dispatch_ids(&failed));
        }
        if delivered.is_empty() {
            return false;
        }

        let ids = dispatch_ids(&delivered);
        let acknowledged = match self.store.acknowledge_many(ids.clone(), &self.consumer).await {
            Ok(acknowledged) => {
                debug!(consumer = %self.consumer, count = acknowledged, "Acknowledged");
                self.metrics.add_delivered(delivered.len());
                observability::record_dispatches_delivered(&self.consumer, delivered.len());
                let now = now_millis();
                for dispatch in &delivered {
                    observability::record_delivery_latency_ms(
                        &self.consumer,
                        now.saturating_sub(dispatch.timestamp).max(0) as f64,
                    );
                }
                if let Ok(mut stats) = self.stats.lock() {
                    stats.record_delivered(&self.consumer, &delivered, now);
                }
                true
            }
            Err(e) => {
                error!(consumer = %self.consumer, count = ids.len(), error = %e, "Acknowledge failed");
                self.metrics.inc_ack_failures();
                observability::record_ack_failure(&self.consumer);
                if let Ok(mut stats) = self.stats.lock() {
                    stats.record_ack_failure(&self.consumer);
                }
                false
            }
        };

        self.release(&ids);
        acknowledged
    }

    fn release(&mut self, ids: &[String]) {
        for id in ids {
            self.in_flight.remove(id);
        }
        self.metrics.set_in_flight(self.in_flight.len());
    }

    fn dispose_all(&mut self) {
        let count = self.attempts.len();
        for (_, attempt) in self.attempts.drain() {
            attempt.disposable.dispose();
        }
        self.in_flight.clear();
        self.metrics.set_in_flight(0);
        self.report_rx.close();
        if count > 0 {
            debug!(consumer = %self.consumer, attempts = count, "Disposed in-flight attempts");
        }
    }
}
