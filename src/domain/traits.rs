// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer programs against these traits so the
// concrete input format and the tracking backend can change
// without touching the training workflow.

use anyhow::Result;

use crate::domain::example::NqExample;
use crate::domain::metrics::{EvalLog, TrainLog};

// ─── ExampleSource ────────────────────────────────────────────────────────────
/// Any component that can produce pre-tokenised examples.
///
/// Implementations:
///   - JsonlExampleSource → one JSON record per line
pub trait ExampleSource {
    /// Load every example from this source, in source order.
    /// Malformed records are errors, never skipped.
    fn load_all(&self) -> Result<Vec<NqExample>>;
}

// ─── ExperimentTracker ────────────────────────────────────────────────────────
/// Receives metrics as the run progresses.
///
/// Implementations:
///   - CsvTracker  → appends to per-run CSV files
///   - NoopTracker → tracking disabled
pub trait ExperimentTracker {
    fn log_train(&mut self, log: &TrainLog) -> Result<()>;

    fn log_eval(&mut self, log: &EvalLog) -> Result<()>;

    /// Flush and close the run. Called once, after the final save.
    fn finish(&mut self) -> Result<()>;
}
