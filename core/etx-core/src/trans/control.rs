use serde::Serialize;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Why the abort flag was raised. Only the first reason is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// A step copy reached FAILED
    StepFailed { step: String },
    /// `stop_all()` from the caller
    External,
    /// Shared error count reached `max_errors`
    ErrorLimit,
    /// Source steps emitted `row_limit` rows
    RowLimit,
}

/// Run-scoped shared state: the abort flag and the error counter.
///
/// Created when a transformation is built and dropped with it, so two runs
/// never share a flag. Every operation is a single atomic; plugin code needs
/// no external locking.
#[derive(Debug)]
pub struct TransControl {
    stopped: AtomicBool,
    reason: OnceLock<StopReason>,
    errors: AtomicU64,
    source_rows: AtomicU64,
    max_errors: Option<u64>,
    row_limit: Option<u64>,
}

impl TransControl {
    pub fn new(max_errors: Option<u64>, row_limit: Option<u64>) -> Self {
        Self {
            stopped: AtomicBool::new(false),
            reason: OnceLock::new(),
            errors: AtomicU64::new(0),
            source_rows: AtomicU64::new(0),
            max_errors,
            row_limit,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None, None)
    }

    /// Raises the abort flag. Returns true if this call raised it.
    pub fn stop(&self, reason: StopReason) -> bool {
        let _ = self.reason.set(reason);
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.reason.get()
    }

    /// Adds to the shared error count and returns the new total.
    pub fn add_errors(&self, n: u64) -> u64 {
        let total = self.errors.fetch_add(n, Ordering::SeqCst) + n;
        if let Some(limit) = self.max_errors
            && total >= limit
            && self.stop(StopReason::ErrorLimit)
        {
            tracing::warn!(errors = total, limit, "error limit reached, stopping all steps");
        }
        total
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::SeqCst)
    }

    /// Counts rows emitted by a source step.
    pub fn record_source_rows(&self, n: u64) {
        let total = self.source_rows.fetch_add(n, Ordering::SeqCst) + n;
        if let Some(limit) = self.row_limit
            && total >= limit
            && self.stop(StopReason::RowLimit)
        {
            tracing::warn!(rows = total, limit, "row limit reached, stopping all steps");
        }
    }

    pub fn source_rows(&self) -> u64 {
        self.source_rows.load(Ordering::SeqCst)
    }
}

impl Default for TransControl {
    fn default() -> Self {
        Self::unlimited()
    }
}
