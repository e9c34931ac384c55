//! LogDispatcher - logs dispatch summaries via tracing

use contracts::{DeliveryCallback, Dispatch, Dispatcher, Disposable};
use tracing::{info, instrument};

/// Dispatcher that logs every Dispatch and acknowledges it immediately
pub struct LogDispatcher {
    name: String,
    dispatch_limit: usize,
}

impl LogDispatcher {
    /// Create a new LogDispatcher with the given name
    pub fn new(name: impl Into<String>, dispatch_limit: usize) -> Self {
        Self {
            name: name.into(),
            dispatch_limit: dispatch_limit.max(1),
        }
    }

    fn log_dispatch_summary(&self, dispatch: &Dispatch) {
        info!(
            dispatcher = %self.name,
            dispatch_id = %dispatch.id,
            event = dispatch.event_name().unwrap_or("<unnamed>"),
            timestamp = dispatch.timestamp,
            fields = dispatch.payload.len(),
            "Dispatch received"
        );
    }
}

impl Dispatcher for LogDispatcher {
    fn id(&self) -> &str {
        &self.name
    }

    fn dispatch_limit(&self) -> usize {
        self.dispatch_limit
    }

    #[instrument(
        name = "log_dispatcher_dispatch",
        skip(self, batch, callback),
        fields(dispatcher = %self.name, size = batch.len())
    )]
    fn dispatch(&self, batch: Vec<Dispatch>, callback: DeliveryCallback) -> Disposable {
        for dispatch in &batch {
            self.log_dispatch_summary(dispatch);
        }
        callback.delivered(batch);
        Disposable::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Payload;

    #[tokio::test]
    async fn test_log_dispatcher_acknowledges_everything() {
        let dispatcher = LogDispatcher::new("my_logger", 5);
        let (callback, mut rx) = DeliveryCallback::channel(7);

        let batch = vec![
            Dispatch::new("a", 1, Payload::new()),
            Dispatch::new("b", 2, Payload::new()),
        ];
        dispatcher.dispatch(batch, callback);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.attempt, 7);
        assert_eq!(report.delivered.len(), 2);
    }

    #[test]
    fn test_log_dispatcher_identity() {
        let dispatcher = LogDispatcher::new("my_logger", 0);
        assert_eq!(dispatcher.id(), "my_logger");
        assert_eq!(dispatcher.dispatch_limit(), 1);
    }
}
