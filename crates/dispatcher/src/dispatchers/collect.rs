//! CollectDispatcher - sends batches to a collection endpoint through a Transport

use std::sync::Arc;

use contracts::{
    DeliveryCallback, Dispatch, Dispatcher, Disposable, Payload, Transport, COLLECT_CONSUMER_ID,
};
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Wire body of one batch
#[derive(Debug, Serialize)]
struct CollectBody<'a> {
    sent_at: i64,
    dispatches: Vec<&'a Payload>,
}

/// Dispatcher that posts batches as JSON to a collection endpoint
///
/// A batch is acknowledged as a whole once the transport reports success. A failed
/// send or encode hands the batch back through [`DeliveryCallback::failed`], which
/// keeps it queued for the next drain.
pub struct CollectDispatcher<T> {
    name: String,
    dispatch_limit: usize,
    transport: Arc<T>,
}

impl<T> CollectDispatcher<T>
where
    T: Transport + Sync + 'static,
{
    pub fn new(name: impl Into<String>, dispatch_limit: usize, transport: T) -> Self {
        Self {
            name: name.into(),
            dispatch_limit: dispatch_limit.max(1),
            transport: Arc::new(transport),
        }
    }

    /// Collect dispatcher under the default consumer id
    pub fn with_default_id(dispatch_limit: usize, transport: T) -> Self {
        Self::new(COLLECT_CONSUMER_ID, dispatch_limit, transport)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn encode(batch: &[Dispatch]) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&CollectBody {
        sent_at: chrono::Utc::now().timestamp_millis(),
        dispatches: batch.iter().map(|d| &d.payload).collect(),
    })
}

impl<T> Dispatcher for CollectDispatcher<T>
where
    T: Transport + Sync + 'static,
{
    fn id(&self) -> &str {
        &self.name
    }

    fn dispatch_limit(&self) -> usize {
        self.dispatch_limit
    }

    #[instrument(
        name = "collect_dispatcher_dispatch",
        skip(self, batch, callback),
        fields(dispatcher = %self.name, size = batch.len())
    )]
    fn dispatch(&self, batch: Vec<Dispatch>, callback: DeliveryCallback) -> Disposable {
        let body = match encode(&batch) {
            Ok(body) => body,
            Err(e) => {
                warn!(dispatcher = %self.name, error = %e, "Encoding batch failed");
                callback.failed(batch);
                return Disposable::noop();
            }
        };

        let name = self.name.clone();
        let transport = Arc::clone(&self.transport);
        let task = tokio::spawn(async move {
            match transport.send(&body).await {
                Ok(()) => {
                    debug!(
                        dispatcher = %name,
                        endpoint = transport.endpoint(),
                        bytes = body.len(),
                        "Batch sent"
                    );
                    callback.delivered(batch);
                }
                Err(e) => {
                    warn!(dispatcher = %name, error = %e, "Batch send failed");
                    callback.failed(batch);
                }
            }
        });
        Disposable::from_task(task)
    }
}
