// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Everything that builds or trains tensors lives here.
//
//   attention.rs — block-sparse layout: global, window and
//                  random blocks, and the length rule that
//                  falls back to full attention
//
//   model.rs     — BigBird-style encoder with a span head
//                  • Token + positional embeddings
//                  • Multi-head self-attention, masked to the
//                    sparse layout when sequences are long
//                  • Feed-forward networks (GELU activation)
//                  • Start / end logits per token
//
//   schedule.rs  — linear learning-rate decay, no warmup
//
//   trainer.rs   — gradient accumulation, periodic logging
//                  and checkpoints, per-epoch evaluation,
//                  and the save-on-exit session guard
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Zaheer et al. (2020) Big Bird: Transformers for Longer Sequences

/// Sparse attention layout and selection
pub mod attention;

/// Encoder Q&A model architecture
pub mod model;

/// Learning-rate schedule
pub mod schedule;

/// Training loop with evaluation and checkpointing
pub mod trainer;
