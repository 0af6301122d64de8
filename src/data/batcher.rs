// ============================================================
// Layer 4 — Collation with Dynamic Padding
// ============================================================
// Turns a Vec<NqExample> of ragged sequences into one
// rectangular NqBatch.
//
// How padding works here:
//   width = max(longest sequence in the batch, threshold)
//   every row is right-padded with pad_id up to `width`
//
// Why a threshold at all?
//   Block-sparse attention only kicks in above a length that
//   depends on block_size and num_random_blocks (704 tokens
//   with the defaults). Short batches would otherwise flip the
//   model into full attention mid-run. Flooring the width at
//   1024 keeps every batch on the same attention path.
//
// The attention mask comes from each example's own length,
// not from comparing tokens with pad_id: a content token that
// happens to equal pad_id is still attended to.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::domain::example::NqExample;

/// Padding floor applied to every batch
pub const PAD_THRESHOLD: usize = 1024;

/// Token id written into padded positions unless the tokenizer says otherwise
pub const DEFAULT_PAD_ID: u32 = 0;

// ─── CollatedBatch ────────────────────────────────────────────────────────────
/// A padded batch as plain row-major vectors, before tensor creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollatedBatch {
    pub batch_size:      usize,
    pub width:           usize,
    /// [batch_size * width], row-major
    pub input_ids:       Vec<u32>,
    /// [batch_size * width], 1 = real token, 0 = padding
    pub attention_mask:  Vec<u32>,
    /// Target index per example; `width` means no target
    pub start_positions: Vec<usize>,
    pub end_positions:   Vec<usize>,
}

#[cfg(test)]
impl CollatedBatch {
    pub fn row(&self, i: usize) -> &[u32] {
        &self.input_ids[i * self.width..(i + 1) * self.width]
    }

    pub fn mask_row(&self, i: usize) -> &[u32] {
        &self.attention_mask[i * self.width..(i + 1) * self.width]
    }
}

/// Pad `items` to a common width of `max(longest, threshold)`.
///
/// Span targets are clamped at 0; a target past the end of its
/// example becomes `width`, which the loss ignores.
///
/// # Panics
/// If `items` is empty. The DataLoader never produces empty batches.
pub fn collate(items: &[NqExample], pad_id: u32, threshold: usize) -> CollatedBatch {
    assert!(!items.is_empty(), "collate called with an empty batch");

    let longest = items.iter().map(NqExample::len).max().unwrap_or(0);
    let width = longest.max(threshold);
    let batch_size = items.len();

    let mut input_ids = Vec::with_capacity(batch_size * width);
    let mut attention_mask = Vec::with_capacity(batch_size * width);
    let mut pad_in_content = 0usize;

    for item in items {
        let len = item.len();
        pad_in_content += item.input_ids.iter().filter(|&&t| t == pad_id).count();

        input_ids.extend_from_slice(&item.input_ids);
        input_ids.resize(input_ids.len() + (width - len), pad_id);

        attention_mask.resize(attention_mask.len() + len, 1);
        attention_mask.resize(attention_mask.len() + (width - len), 0);
    }

    if pad_in_content > 0 {
        tracing::debug!(
            "{} content tokens equal the pad id {}; they stay unmasked",
            pad_in_content,
            pad_id
        );
    }

    CollatedBatch {
        batch_size,
        width,
        input_ids,
        attention_mask,
        start_positions: items.iter().map(|x| x.start_target().unwrap_or(width)).collect(),
        end_positions:   items.iter().map(|x| x.end_target().unwrap_or(width)).collect(),
    }
}

// ─── NqBatch ──────────────────────────────────────────────────────────────────
/// A batch of examples ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct NqBatch<B: Backend> {
    /// Token ids [batch_size, width]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding [batch_size, width]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Answer start per example [batch_size]; `width` = ignored
    pub start_positions: Tensor<B, 1, Int>,

    /// Answer end per example [batch_size]
    pub end_positions: Tensor<B, 1, Int>,
}

// ─── NqBatcher ────────────────────────────────────────────────────────────────
#[derive(Clone, Debug)]
pub struct NqBatcher<B: Backend> {
    pub device:    B::Device,
    pub pad_id:    u32,
    pub threshold: usize,
}

impl<B: Backend> NqBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device, pad_id: DEFAULT_PAD_ID, threshold: PAD_THRESHOLD }
    }

    pub fn with_pad_id(mut self, pad_id: u32) -> Self {
        self.pad_id = pad_id;
        self
    }

    pub fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }
}

impl<B: Backend> Batcher<NqExample, NqBatch<B>> for NqBatcher<B> {
    fn batch(&self, items: Vec<NqExample>) -> NqBatch<B> {
        let c = collate(&items, self.pad_id, self.threshold);
        let shape = [c.batch_size, c.width];

        let to_i64 = |v: &[u32]| v.iter().map(|&x| x as i64).collect::<Vec<_>>();
        let pos_i64 = |v: &[usize]| v.iter().map(|&x| x as i64).collect::<Vec<_>>();

        let input_ids = Tensor::<B, 2, Int>::from_data(
            TensorData::new(to_i64(&c.input_ids), shape),
            &self.device,
        );
        let attention_mask = Tensor::<B, 2, Int>::from_data(
            TensorData::new(to_i64(&c.attention_mask), shape),
            &self.device,
        );
        let start_positions = Tensor::<B, 1, Int>::from_data(
            TensorData::new(pos_i64(&c.start_positions), [c.batch_size]),
            &self.device,
        );
        let end_positions = Tensor::<B, 1, Int>::from_data(
            TensorData::new(pos_i64(&c.end_positions), [c.batch_size]),
            &self.device,
        );

        NqBatch { input_ids, attention_mask, start_positions, end_positions }
    }
}
