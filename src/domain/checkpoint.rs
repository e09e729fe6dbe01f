//! Latest persisted record per instrument.

use crate::domain::error::SyncError;
use crate::domain::price_point::PricePoint;
use crate::ports::store_port::StorePort;
use tracing::warn;

/// The checkpoint lookup. A failed read degrades to `None` so the instrument
/// is re-fetched in full; the failure is returned alongside for the summary.
pub struct CheckpointLoad {
    pub checkpoint: Option<PricePoint>,
    pub error: Option<SyncError>,
}

pub fn load_checkpoint(store: &dyn StorePort, code: &str) -> CheckpointLoad {
    match store.get_latest(code) {
        Ok(checkpoint) => CheckpointLoad {
            checkpoint,
            error: None,
        },
        Err(e) => {
            warn!(code = %code, error = %e, "checkpoint read failed, fetching full history");
            CheckpointLoad {
                checkpoint: None,
                error: Some(SyncError::CheckpointRead {
                    code: code.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
    }
}
