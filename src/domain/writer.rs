//! Batched, idempotent writes with caller-controlled commit windows.
//!
//! Batches are held in memory per instrument and merged into the store only
//! when the orchestrator flushes, so a failed flush rolls back exactly the
//! instruments staged since the previous successful one.

use crate::domain::error::SyncError;
use crate::domain::price_point::PricePoint;
use crate::ports::store_port::StorePort;
use tracing::{debug, error};

#[derive(Debug)]
struct StagedBatch {
    code: String,
    points: Vec<PricePoint>,
}

#[derive(Debug, Default)]
pub struct BatchWriter {
    staged: Vec<StagedBatch>,
    committed: usize,
}

impl BatchWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `points` for `code` until the next flush. Empty batches still count
    /// as an instrument in the window.
    pub fn stage(&mut self, code: &str, points: Vec<PricePoint>) {
        self.staged.push(StagedBatch {
            code: code.to_string(),
            points,
        });
    }

    pub fn staged_instruments(&self) -> usize {
        self.staged.len()
    }

    /// Instruments whose batches are durable.
    pub fn committed_instruments(&self) -> usize {
        self.committed
    }

    /// Merge every staged batch and commit. Returns the number of instruments committed.
    pub fn flush(&mut self, store: &mut dyn StorePort) -> Result<usize, SyncError> {
        let staged = std::mem::take(&mut self.staged);
        if staged.is_empty() {
            return Ok(0);
        }

        match Self::write_window(store, &staged) {
            Ok(()) => {
                self.committed += staged.len();
                debug!(
                    instruments = staged.len(),
                    committed = self.committed,
                    "commit window flushed"
                );
                Ok(staged.len())
            }
            Err(e) => {
                if let Err(rollback_err) = store.rollback() {
                    error!(error = %rollback_err, "rollback after failed flush also failed");
                }
                Err(into_store_write(e))
            }
        }
    }

    fn write_window(store: &mut dyn StorePort, staged: &[StagedBatch]) -> Result<(), SyncError> {
        for batch in staged.iter().filter(|b| !b.points.is_empty()) {
            store.upsert_batch(&batch.code, &batch.points)?;
        }
        store.commit()
    }
}

fn into_store_write(err: SyncError) -> SyncError {
    match err {
        SyncError::StoreWrite { .. } => err,
        other => SyncError::StoreWrite {
            reason: other.to_string(),
        },
    }
}
