//! Coarse, out-of-band cancellation of outstanding lineages.
//!
//! The signal is a single timestamp marker. Any lineage that started at or
//! before the latest cancellation is stale: its next continuation finds the
//! marker and returns without checking or continuing. A check already in
//! flight is never interrupted.

use std::sync::Arc;

use tracing::info;
use vigil_core::now_ms;
use vigil_store::{HistoryStore, CANCELLED_AT};

use crate::error::Result;

#[derive(Clone)]
pub struct CancellationSignal {
    history: Arc<HistoryStore>,
}

impl CancellationSignal {
    pub fn new(history: Arc<HistoryStore>) -> Self {
        Self { history }
    }

    /// Mark every lineage started up to now as stale. Returns the marker value.
    ///
    /// Idempotent apart from moving the marker strictly forward.
    pub fn cancel(&self, reason: &str) -> Result<i64> {
        let at = match self.cancelled_at()? {
            Some(previous) => now_ms().max(previous + 1),
            None => now_ms(),
        };
        self.history.set_marker(CANCELLED_AT, at, Some(reason))?;
        info!(cancelled_at = at, %reason, "outstanding cycles cancelled");
        Ok(at)
    }

    /// True if a cancellation was requested at or after `lineage_start`.
    pub fn is_cancelled(&self, lineage_start: i64) -> Result<bool> {
        Ok(self
            .cancelled_at()?
            .is_some_and(|at| at >= lineage_start))
    }

    pub fn cancelled_at(&self) -> Result<Option<i64>> {
        Ok(self.history.marker(CANCELLED_AT)?.map(|m| m.value))
    }

    /// A start time for a new lineage that no earlier cancellation covers.
    pub fn fresh_start(&self) -> Result<i64> {
        let now = now_ms();
        Ok(match self.cancelled_at()? {
            Some(at) => now.max(at + 1),
            None => now,
        })
    }
}
