//! Transactional write handle

use std::collections::HashSet;

use contracts::Dispatch;

use crate::error::{PersistenceError, Result};
use crate::queue::{EditOp, EditSummary};
use crate::DispatchStore;

/// Collects queue operations and applies them in one transaction
///
/// Once [`DispatchEditor::commit`] has run (successfully or not) the editor is
/// closed and every further call fails with [`PersistenceError::EditorClosed`].
pub struct DispatchEditor {
    store: DispatchStore,
    ops: Vec<EditOp>,
    closed: bool,
}

impl DispatchEditor {
    pub(crate) fn new(store: DispatchStore) -> Self {
        Self {
            store,
            ops: Vec::new(),
            closed: false,
        }
    }

    /// Stage `dispatches` for every consumer in `consumers`
    pub fn enqueue(
        &mut self,
        dispatches: Vec<Dispatch>,
        consumers: &HashSet<String>,
    ) -> Result<&mut Self> {
        self.ensure_open()?;
        self.ops.push(EditOp::Enqueue {
            dispatches,
            consumers: consumers.clone(),
        });
        Ok(self)
    }

    /// Stage acknowledgement of `ids` for `consumer`
    pub fn acknowledge(&mut self, ids: Vec<String>, consumer: &str) -> Result<&mut Self> {
        self.ensure_open()?;
        self.ops.push(EditOp::Acknowledge {
            ids,
            consumer: consumer.to_string(),
        });
        Ok(self)
    }

    /// Stage removal of every queue entry of `consumer`
    pub fn reset_consumer(&mut self, consumer: &str) -> Result<&mut Self> {
        self.ensure_open()?;
        self.ops.push(EditOp::ResetConsumer {
            consumer: consumer.to_string(),
        });
        Ok(self)
    }

    /// Number of staged operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every staged operation atomically and close the editor
    pub async fn commit(&mut self) -> Result<EditSummary> {
        self.ensure_open()?;
        self.closed = true;

        let ops = std::mem::take(&mut self.ops);
        if ops.is_empty() {
            return Ok(EditSummary::default());
        }
        self.store.apply(ops).await
    }

    /// Whether `commit` has already run
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(PersistenceError::EditorClosed)
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for DispatchEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEditor")
            .field("ops", &self.ops.len())
            .field("closed", &self.closed)
            .finish()
    }
}
