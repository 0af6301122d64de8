// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Pre-tokenised JSONL files all the way to tensor batches.
//
//   nq-*.jsonl
//       │
//       ▼
//   JsonlExampleSource → parses one record per line
//       │
//       ▼
//   subsample          → optional seeded draw (small runs)
//       │
//       ▼
//   filter_answerless  → drops (0, 0) spans
//       │
//       ▼
//   NqDataset          → implements Burn's Dataset trait
//       │
//       ▼
//   NqBatcher          → dynamic padding into tensor batches
//       │
//       ▼
//   DataLoader         → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Loads pre-tokenised examples from .jsonl files
pub mod loader;

/// Subsampling, answerless filtering, length-grouped ordering
pub mod sampler;

/// Example storage and the ordered views Burn's DataLoader reads
pub mod dataset;

/// Dynamic-padding collation and Burn's Batcher trait
pub mod batcher;
