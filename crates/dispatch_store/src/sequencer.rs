//! Write sequencer
//!
//! A dedicated thread owns the [`QueueDb`]; every read and write is a job sent over a
//! bounded channel and answered through a oneshot. Callers on any thread are queued,
//! never run in parallel.

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{PersistenceError, Result};
use crate::queue::QueueDb;

/// Maximum number of queued jobs before callers wait
const JOB_CHANNEL_SIZE: usize = 1024;

type Job = Box<dyn FnOnce(&mut QueueDb) + Send>;

/// Handle to the sequencer thread
#[derive(Clone)]
pub(crate) struct Sequencer {
    tx: mpsc::Sender<Job>,
}

impl Sequencer {
    /// Spawn the sequencer thread owning `db`
    ///
    /// The thread exits once every handle has been dropped.
    pub(crate) fn spawn(db: QueueDb) -> Result<Self> {
        let (tx, mut rx) = mpsc::channel::<Job>(JOB_CHANNEL_SIZE);

        std::thread::Builder::new()
            .name("beacon-dispatch-store".to_string())
            .spawn(move || {
                let mut db = db;
                while let Some(job) = rx.blocking_recv() {
                    job(&mut db);
                }
                debug!("dispatch store sequencer stopped");
            })?;

        Ok(Self { tx })
    }

    /// Run `f` on the sequencer and wait for its result
    pub(crate) async fn run<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut QueueDb) -> Result<R> + Send + 'static,
    {
        let (response_tx, response_rx) = oneshot::channel();
        let job: Job = Box::new(move |db| {
            let _ = response_tx.send(f(db));
        });

        self.tx
            .send(job)
            .await
            .map_err(|_| PersistenceError::SequencerClosed)?;

        response_rx
            .await
            .map_err(|_| PersistenceError::SequencerClosed)?
    }
}
