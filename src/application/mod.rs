// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates the other layers to accomplish one
// goal: fine-tune a model, or inspect the data it trains on.
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - Everything comes in through an explicit RunConfig;
//     nothing here reads the environment
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Every option of a run, serialisable
pub mod config;

// The fine-tuning workflow
pub mod train_use_case;

// Decode a few examples to check the preprocessing
pub mod inspect_use_case;
