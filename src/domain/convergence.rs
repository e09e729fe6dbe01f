//! Classification of freshly fetched records against the stored checkpoint.

use crate::domain::price_point::PricePoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// No checkpoint, or the record is newer than it.
    New,
    /// Same date as the checkpoint but different open/high/low/close.
    Changed,
    /// Same date and prices as the checkpoint. Terminal for the fetch.
    Converged,
    /// Older than the checkpoint; the checkpoint's own date never came back.
    Backfill,
}

impl Convergence {
    /// Whether the record must be handed to the writer.
    pub fn is_written(self) -> bool {
        !matches!(self, Convergence::Converged)
    }
}

pub fn classify(record: &PricePoint, checkpoint: Option<&PricePoint>) -> Convergence {
    let Some(checkpoint) = checkpoint else {
        return Convergence::New;
    };

    if record.date > checkpoint.date {
        Convergence::New
    } else if record.date < checkpoint.date {
        Convergence::Backfill
    } else if record.same_prices(checkpoint) {
        Convergence::Converged
    } else {
        Convergence::Changed
    }
}
