//! Dispatcher trait - consumer of queued Dispatches
//!
//! A Dispatcher receives bounded batches and reports back, possibly in several
//! parts, which Dispatches it has delivered and which it gave up on.

use std::fmt;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::Dispatch;

/// Consumer id of the network collection dispatcher
pub const COLLECT_CONSUMER_ID: &str = "collect";

/// Consumer registration: id plus the largest batch it accepts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerInfo {
    pub id: String,
    pub dispatch_limit: usize,
}

impl ConsumerInfo {
    pub fn new(id: impl Into<String>, dispatch_limit: usize) -> Self {
        Self {
            id: id.into(),
            dispatch_limit,
        }
    }

    /// Registration of a running dispatcher
    pub fn of(dispatcher: &dyn Dispatcher) -> Self {
        Self::new(dispatcher.id(), dispatcher.dispatch_limit())
    }
}

/// Partial or full completion of one dispatch attempt
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// Attempt the report belongs to
    pub attempt: u64,
    /// Dispatches delivered since the last report
    pub delivered: Vec<Dispatch>,
    /// Dispatches the dispatcher could not deliver; they stay queued
    pub failed: Vec<Dispatch>,
}

/// Completion handle passed to [`Dispatcher::dispatch`]
///
/// May be invoked any number of times; each call acknowledges or releases the given
/// subset. Calls after the owning drain loop has been disposed are ignored.
#[derive(Clone)]
pub struct DeliveryCallback {
    attempt: u64,
    tx: mpsc::UnboundedSender<DeliveryReport>,
}

impl DeliveryCallback {
    pub fn new(attempt: u64, tx: mpsc::UnboundedSender<DeliveryReport>) -> Self {
        Self { attempt, tx }
    }

    /// Standalone callback plus the receiver of its reports
    pub fn channel(attempt: u64) -> (Self, mpsc::UnboundedReceiver<DeliveryReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(attempt, tx), rx)
    }

    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Report `delivered` as done
    pub fn delivered(&self, delivered: Vec<Dispatch>) {
        if delivered.is_empty() {
            return;
        }
        let _ = self.tx.send(DeliveryReport {
            attempt: self.attempt,
            delivered,
            failed: Vec::new(),
        });
    }

    /// Give `failed` back without acknowledging it
    ///
    /// The Dispatches stay queued and are offered again on the next drain.
    pub fn failed(&self, failed: Vec<Dispatch>) {
        if failed.is_empty() {
            return;
        }
        let _ = self.tx.send(DeliveryReport {
            attempt: self.attempt,
            delivered: Vec::new(),
            failed,
        });
    }

    /// True once nobody listens for reports anymore
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for DeliveryCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryCallback")
            .field("attempt", &self.attempt)
            .finish()
    }
}

/// Cancellation handle for an in-progress operation
pub struct Disposable {
    on_dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposable {
    pub fn new(on_dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_dispose: Some(Box::new(on_dispose)),
        }
    }

    /// Nothing to cancel
    pub fn noop() -> Self {
        Self { on_dispose: None }
    }

    /// Abort `task` on dispose
    pub fn from_task<T: Send + 'static>(task: JoinHandle<T>) -> Self {
        let abort = task.abort_handle();
        Self::new(move || abort.abort())
    }

    /// Cancel the operation
    pub fn dispose(mut self) {
        if let Some(on_dispose) = self.on_dispose.take() {
            on_dispose();
        }
    }
}

impl fmt::Debug for Disposable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposable")
            .field("pending", &self.on_dispose.is_some())
            .finish()
    }
}

/// Output interface of the dispatch queue
///
/// All consumer implementations must implement this trait.
pub trait Dispatcher: Send + Sync {
    /// Consumer id (used for queueing, logging and metrics)
    fn id(&self) -> &str;

    /// Largest batch this dispatcher accepts
    fn dispatch_limit(&self) -> usize {
        1
    }

    /// Start delivering `batch`
    ///
    /// Report delivered Dispatches through `callback`, in one or several calls.
    /// Returns a handle that cancels the attempt.
    fn dispatch(&self, batch: Vec<Dispatch>, callback: DeliveryCallback) -> Disposable;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dispose_runs_once() {
        let flag = Arc::new(AtomicBool::new(false));
        let inner = Arc::clone(&flag);
        let disposable = Disposable::new(move || inner.store(true, Ordering::SeqCst));

        disposable.dispose();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_callback_reports_carry_attempt() {
        let (callback, mut rx) = DeliveryCallback::channel(42);
        callback.delivered(vec![Dispatch::new("a", 1, Default::default())]);
        callback.delivered(Vec::new());

        let report = rx.recv().await.unwrap();
        assert_eq!(report.attempt, 42);
        assert_eq!(report.delivered.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_report_carries_no_deliveries() {
        let (callback, mut rx) = DeliveryCallback::channel(7);
        callback.failed(vec![Dispatch::new("a", 1, Default::default())]);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.attempt, 7);
        assert!(report.delivered.is_empty());
        assert_eq!(report.failed[0].id, "a");
    }

    #[tokio::test]
    async fn test_callback_after_receiver_dropped_is_ignored() {
        let (callback, rx) = DeliveryCallback::channel(1);
        drop(rx);
        assert!(callback.is_closed());
        callback.delivered(vec![Dispatch::new("a", 1, Default::default())]);
    }
}
