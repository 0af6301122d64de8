// ============================================================
// Layer 5 — Block-Sparse Attention Layout
// ============================================================
// BigBird-style sparsity, expressed as a boolean mask over
// dense attention scores.
//
// The sequence is cut into blocks of `block_size` tokens and
// attention is decided per (query block, key block) pair:
//
//   global  — block 0 and the last block attend to every block,
//             and every block attends to them
//   window  — block i attends to i-1, i, i+1
//   random  — each middle block attends to `num_random_blocks`
//             other middle blocks outside its window
//
//          k0 k1 k2 k3 k4 k5
//     q0 [ x  x  x  x  x  x ]
//     q1 [ x  x  x  .  r  x ]
//     q2 [ x  x  x  x  .  x ]     x = window / global
//     q3 [ x  r  x  x  x  x ]     r = random
//     q4 [ x  .  r  x  x  x ]
//     q5 [ x  x  x  x  x  x ]
//
// Random blocks are drawn from a seeded RNG so the same
// sequence length always yields the same layout.
//
// Reference: Zaheer et al. (2020) Big Bird: Transformers for
//            Longer Sequences, §2 and Appendix D

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionType {
    /// Global + window + random blocks
    BlockSparse,
    /// Every token attends to every token
    OriginalFull,
}

impl std::str::FromStr for AttentionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block_sparse" => Ok(Self::BlockSparse),
            "original_full" => Ok(Self::OriginalFull),
            other => Err(format!(
                "unknown attention type '{other}' (expected block_sparse or original_full)"
            )),
        }
    }
}

/// Shortest sequence that still runs block-sparse.
///
/// At or below this length a block-sparse layout would let every
/// token see (almost) every other token anyway, so full attention
/// is used instead.
pub fn sparse_min_len(block_size: usize, num_random_blocks: usize) -> usize {
    (5 + 2 * num_random_blocks) * block_size
}

/// Attention path actually taken for a sequence of `seq_len` tokens.
pub fn effective_attention(
    requested:         AttentionType,
    seq_len:           usize,
    block_size:        usize,
    num_random_blocks: usize,
) -> AttentionType {
    match requested {
        AttentionType::OriginalFull => AttentionType::OriginalFull,
        AttentionType::BlockSparse if seq_len > sparse_min_len(block_size, num_random_blocks) => {
            AttentionType::BlockSparse
        }
        AttentionType::BlockSparse => {
            tracing::debug!(
                "Sequence length {} <= {}; switching to full attention",
                seq_len,
                sparse_min_len(block_size, num_random_blocks)
            );
            AttentionType::OriginalFull
        }
    }
}

/// Block-level layout: `layout[q][k]` is true if query block `q`
/// may attend to key block `k`.
pub fn block_layout(num_blocks: usize, num_random_blocks: usize, seed: u64) -> Vec<Vec<bool>> {
    let mut layout = vec![vec![false; num_blocks]; num_blocks];
    if num_blocks == 0 {
        return layout;
    }
    let last = num_blocks - 1;
    let mut rng = StdRng::seed_from_u64(seed ^ num_blocks as u64);

    for q in 0..num_blocks {
        // global rows and columns
        if q == 0 || q == last {
            layout[q].iter_mut().for_each(|v| *v = true);
            continue;
        }
        layout[q][0] = true;
        layout[q][last] = true;

        // sliding window
        for k in q.saturating_sub(1)..=(q + 1).min(last) {
            layout[q][k] = true;
        }

        // random middle blocks outside the window
        let candidates: Vec<usize> = (1..last)
            .filter(|&k| k + 1 < q || k > q + 1)
            .collect();
        for &k in candidates.choose_multiple(&mut rng, num_random_blocks) {
            layout[q][k] = true;
        }
    }
    layout
}

/// Token-level mask for `seq_len` tokens in burn's convention:
/// `true` = the (query, key) pair is masked OUT.
///
/// Returned row-major, `[seq_len * seq_len]`.
/// `seq_len` must be a multiple of `block_size`.
pub fn block_sparse_mask(
    seq_len:           usize,
    block_size:        usize,
    num_random_blocks: usize,
    seed:              u64,
) -> Vec<bool> {
    debug_assert_eq!(seq_len % block_size, 0);
    let num_blocks = seq_len / block_size;
    let layout = block_layout(num_blocks, num_random_blocks, seed);

    let mut mask = vec![true; seq_len * seq_len];
    for q in 0..seq_len {
        let qb = q / block_size;
        let row = &mut mask[q * seq_len..(q + 1) * seq_len];
        for (kb, &allowed) in layout[qb].iter().enumerate() {
            if allowed {
                row[kb * block_size..(kb + 1) * block_size]
                    .iter_mut()
                    .for_each(|m| *m = false);
            }
        }
    }
    mask
}
