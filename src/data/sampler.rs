// ============================================================
// Layer 4 — Subsampling, Filtering and Length Grouping
// ============================================================
// Three index-level operations on example collections:
//
//   subsample          → seeded draw WITH replacement, for fast
//                        iteration on a small slice of the data
//   filter_answerless  → drop (0, 0) "no answer" examples
//   length_grouped_indices
//                      → per-epoch batch order that keeps
//                        similar lengths together
//
// Length grouping:
//   Indices are shuffled, cut into mega-batches of
//   MEGABATCH_MULT * batch_size, and each mega-batch is sorted
//   by descending length. Consecutive mini-batches then hold
//   sequences of similar length, so dynamic padding wastes
//   little compute, while the shuffle keeps epochs varied.
//
// Reference: rand crate documentation (StdRng, SliceRandom)

use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use crate::domain::example::NqExample;

pub const MEGABATCH_MULT: usize = 50;

/// Draw `size` examples uniformly from `examples`, with replacement.
///
/// The same `seed` always yields the same selection.
/// Duplicates are possible. Empty input gives empty output.
pub fn subsample(examples: &[NqExample], size: usize, seed: u64) -> Vec<NqExample> {
    subsample_indices(examples.len(), size, seed)
        .into_iter()
        .map(|i| examples[i].clone())
        .collect()
}

/// The index draw behind `subsample`.
pub fn subsample_indices(len: usize, size: usize, seed: u64) -> Vec<usize> {
    if len == 0 {
        return Vec::new();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size).map(|_| rng.gen_range(0..len)).collect()
}

/// Drop every example whose span is the (0, 0) "no answer" marker.
pub fn filter_answerless(examples: Vec<NqExample>) -> Vec<NqExample> {
    let before = examples.len();
    let kept: Vec<NqExample> = examples
        .into_iter()
        .filter(|ex| !ex.is_answerless())
        .collect();

    tracing::debug!(
        "Filtered {} answerless examples ({} kept)",
        before - kept.len(),
        kept.len()
    );
    kept
}

/// Plain seeded shuffle of `0..len`, used when length grouping is off.
pub fn shuffled_indices(len: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    indices
}

/// Batch order for one epoch with group-by-length.
///
/// `lengths[i]` is the token length of example `i`.
/// Returns a permutation of `0..lengths.len()`.
pub fn length_grouped_indices(lengths: &[usize], batch_size: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..lengths.len()).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let megabatch = (batch_size * MEGABATCH_MULT).max(1);
    for chunk in indices.chunks_mut(megabatch) {
        // stable sort keeps the shuffled order among equal lengths
        chunk.sort_by(|&a, &b| lengths[b].cmp(&lengths[a]));
    }
    indices
}
