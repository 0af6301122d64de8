// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing the core concepts
// of the fine-tuning run.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits

// One pre-tokenised QA example and its span invariant
pub mod example;

// Metric records produced by the training loop
pub mod metrics;

// Core abstractions (traits) that other layers implement
pub mod traits;
