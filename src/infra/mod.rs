// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by the application and ML layers:
//
//   pretrained.rs — Model directory loading
//                   config.json, tokenizer.json and optional
//                   burn weights for the starting model.
//
//   checkpoint.rs — Saving and loading training state
//                   Periodic checkpoints, final and interrupted
//                   model directories, resume support.
//
//   metrics.rs    — Experiment tracking
//                   Per-run CSV curves plus a summary file.
//
//   interrupt.rs  — Ctrl-C handling
//                   Raises a flag the training loop polls.

/// Pretrained model directory loading
pub mod pretrained;

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Experiment tracking to CSV
pub mod metrics;

/// Ctrl-C stop flag
pub mod interrupt;
