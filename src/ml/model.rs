use burn::{
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::log_softmax,
};

use crate::data::batcher::NqBatch;
use crate::ml::attention::{block_sparse_mask, effective_attention, AttentionType};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct BigBirdQaConfig {
    pub vocab_size:              usize,
    pub max_position_embeddings: usize,
    pub hidden_size:             usize,
    pub num_attention_heads:     usize,
    pub num_hidden_layers:       usize,
    pub intermediate_size:       usize,
    pub dropout:                 f64,
    #[config(default = 64)]
    pub block_size:              usize,
    #[config(default = 3)]
    pub num_random_blocks:       usize,
    #[config(default = "AttentionType::BlockSparse")]
    pub attention_type:          AttentionType,
    #[config(default = 0)]
    pub layout_seed:             usize,
}

impl BigBirdQaConfig {
    /// Reject shapes the model cannot run with.
    pub fn check(&self) -> Result<(), String> {
        if self.num_attention_heads == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(format!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            ));
        }
        if self.block_size == 0 {
            return Err("block_size must be positive".to_string());
        }
        if self.attention_type == AttentionType::BlockSparse
            && self.max_position_embeddings % self.block_size != 0
        {
            return Err(format!(
                "max_position_embeddings {} is not a multiple of block_size {}",
                self.max_position_embeddings, self.block_size
            ));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> BigBirdQaModel<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.hidden_size).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_position_embeddings, self.hidden_size).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_hidden_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.hidden_size).init(device);
        let qa_head    = LinearConfig::new(self.hidden_size, 2).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        BigBirdQaModel {
            token_embedding, position_embedding, layers,
            final_norm, qa_head, dropout,
            max_position_embeddings: self.max_position_embeddings,
            block_size:              self.block_size,
            num_random_blocks:       self.num_random_blocks,
            block_sparse:            self.attention_type == AttentionType::BlockSparse,
            layout_seed:             self.layout_seed,
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.hidden_size, self.num_attention_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.hidden_size, self.intermediate_size).init(device);
        let ffn_linear2 = LinearConfig::new(self.intermediate_size, self.hidden_size).init(device);
        let norm1   = LayerNormConfig::new(self.hidden_size).init(device);
        let norm2   = LayerNormConfig::new(self.hidden_size).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// mask_pad: [batch, seq] true on padding keys.
    /// mask_attn: [batch, seq, seq] true on (query, key) pairs outside the sparse layout.
    pub fn forward(
        &self,
        x:         Tensor<B, 3>,
        mask_pad:  Tensor<B, 2, Bool>,
        mask_attn: Option<Tensor<B, 3, Bool>>,
    ) -> Tensor<B, 3> {
        let mut input = MhaInput::self_attn(x.clone()).mask_pad(mask_pad);
        if let Some(mask_attn) = mask_attn {
            input = input.mask_attn(mask_attn);
        }
        let attn_output = self.self_attn.forward(input).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

#[derive(Module, Debug)]
pub struct BigBirdQaModel<B: Backend> {
    pub token_embedding:         Embedding<B>,
    pub position_embedding:      Embedding<B>,
    pub layers:                  Vec<EncoderBlock<B>>,
    pub final_norm:              LayerNorm<B>,
    pub qa_head:                 Linear<B>,
    pub dropout:                 Dropout,
    pub max_position_embeddings: usize,
    pub block_size:              usize,
    pub num_random_blocks:       usize,
    pub block_sparse:            bool,
    pub layout_seed:             usize,
}

pub struct QaModelOutput<B: Backend> {
    pub start_logits: Tensor<B, 2>,
    pub end_logits:   Tensor<B, 2>,
}

impl<B: Backend> BigBirdQaModel<B> {
    /// Attention path this model takes for a sequence of `seq_len` tokens
    pub fn attention_for(&self, seq_len: usize) -> AttentionType {
        let requested = if self.block_sparse {
            AttentionType::BlockSparse
        } else {
            AttentionType::OriginalFull
        };
        effective_attention(requested, seq_len, self.block_size, self.num_random_blocks)
    }

    /// input_ids, attention_mask: [batch, seq_len] → start_logits, end_logits: [batch, seq_len]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
    ) -> QaModelOutput<B> {
        let [batch_size, seq_len] = input_ids.dims();
        let device = input_ids.device();
        let sparse = self.attention_for(seq_len) == AttentionType::BlockSparse;

        // Block-sparse needs whole blocks; pad inside the model and slice back at the end.
        let padded_len = if sparse {
            seq_len.div_ceil(self.block_size) * self.block_size
        } else {
            seq_len
        };
        let (input_ids, attention_mask) = if padded_len > seq_len {
            let extra = padded_len - seq_len;
            (
                Tensor::cat(vec![input_ids, Tensor::zeros([batch_size, extra], &device)], 1),
                Tensor::cat(vec![attention_mask, Tensor::zeros([batch_size, extra], &device)], 1),
            )
        } else {
            (input_ids, attention_mask)
        };

        let mask_pad = attention_mask.equal_elem(0);
        let mask_attn = sparse.then(|| {
            let mask = block_sparse_mask(
                padded_len, self.block_size, self.num_random_blocks, self.layout_seed as u64,
            );
            Tensor::<B, 2, Bool>::from_data(TensorData::new(mask, [padded_len, padded_len]), &device)
                .unsqueeze::<3>()
                .expand([batch_size, padded_len, padded_len])
        });

        let tok_emb = self.token_embedding.forward(input_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..padded_len as i64, &device)
            .unsqueeze::<2>()
            .expand([batch_size, padded_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tok_emb + pos_emb);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone(), mask_attn.clone());
        }
        let x = self.final_norm.forward(x); // [batch, padded_len, hidden]

        // Project to 2 logits per token then split into start / end.
        let logits = self.qa_head.forward(x); // [batch, padded_len, 2]
        let start_logits = logits.clone()
            .slice([0..batch_size, 0..seq_len, 0..1])
            .reshape([batch_size, seq_len]);
        let end_logits = logits
            .slice([0..batch_size, 0..seq_len, 1..2])
            .reshape([batch_size, seq_len]);

        QaModelOutput { start_logits, end_logits }
    }

    /// Loss = (CE_start + CE_end) / 2, each averaged over its valid targets
    pub fn forward_loss(&self, batch: NqBatch<B>) -> (Tensor<B, 1>, QaModelOutput<B>) {
        let output = self.forward(batch.input_ids, batch.attention_mask);
        let loss = (span_cross_entropy(output.start_logits.clone(), batch.start_positions)
                  + span_cross_entropy(output.end_logits.clone(),   batch.end_positions)) / 2.0_f64;
        (loss, output)
    }
}

/// Mean cross-entropy of `logits` [batch, seq_len] against `targets` [batch].
///
/// A target >= seq_len contributes nothing. A batch with no valid
/// target yields 0.
pub fn span_cross_entropy<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> Tensor<B, 1> {
    let [batch_size, seq_len] = logits.dims();
    let valid = targets.clone().lower_elem(seq_len as i64);
    let safe = targets.mask_fill(valid.clone().bool_not(), 0);

    let log_probs = log_softmax(logits, 1);
    let picked = log_probs
        .gather(1, safe.reshape([batch_size, 1]))
        .reshape([batch_size]);

    let weights = valid.float();
    let count = weights.clone().sum().clamp_min(1.0);
    (picked * weights).sum().neg() / count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::NqBatcher;
    use crate::domain::example::NqExample;
    use burn::{backend::NdArray, data::dataloader::batcher::Batcher};

    type TestBackend = NdArray;

    fn tiny_config() -> BigBirdQaConfig {
        BigBirdQaConfig::new(50, 64, 16, 2, 1, 32, 0.0)
            .with_block_size(4)
            .with_num_random_blocks(1)
    }

    #[test]
    fn test_check_rejects_bad_heads() {
        let cfg = BigBirdQaConfig::new(50, 64, 15, 2, 1, 32, 0.0);
        assert!(cfg.check().is_err());
        assert!(tiny_config().check().is_ok());
    }

    #[test]
    fn test_attention_switch_follows_length() {
        let device = Default::default();
        let model: BigBirdQaModel<TestBackend> = tiny_config().init(&device);
        // (5 + 2 * 1) * 4 = 28
        assert_eq!(model.attention_for(28), AttentionType::OriginalFull);
        assert_eq!(model.attention_for(29), AttentionType::BlockSparse);
    }

    #[test]
    fn test_forward_shapes_sparse_with_internal_padding() {
        let device = Default::default();
        let model: BigBirdQaModel<TestBackend> = tiny_config().init(&device);
        let batcher = NqBatcher::<TestBackend>::new(device).with_threshold(30);
        let batch = batcher.batch(vec![
            NqExample::new(vec![3; 10], 1, 2),
            NqExample::new(vec![4; 30], 5, 7),
        ]);

        // 30 is not a multiple of block_size 4
        let out = model.forward(batch.input_ids, batch.attention_mask);
        assert_eq!(out.start_logits.dims(), [2, 30]);
        assert_eq!(out.end_logits.dims(), [2, 30]);
    }

    #[test]
    fn test_forward_shapes_full_attention() {
        let device = Default::default();
        let model: BigBirdQaModel<TestBackend> = tiny_config().init(&device);
        let batcher = NqBatcher::<TestBackend>::new(device).with_threshold(8);
        let batch = batcher.batch(vec![NqExample::new(vec![3; 6], 1, 2)]);

        let out = model.forward(batch.input_ids, batch.attention_mask);
        assert_eq!(out.start_logits.dims(), [1, 8]);
    }

    #[test]
    fn test_loss_is_finite_scalar() {
        let device = Default::default();
        let model: BigBirdQaModel<TestBackend> = tiny_config().init(&device);
        let batcher = NqBatcher::<TestBackend>::new(device).with_threshold(32);
        let batch = batcher.batch(vec![
            NqExample::new(vec![3; 12], 1, 2),
            NqExample::new(vec![5; 20], 4, 9),
        ]);

        let (loss, _) = model.forward_loss(batch);
        let value: f64 = loss.into_scalar().elem::<f64>();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn test_span_cross_entropy_skips_ignored_targets() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 4], &device);

        // uniform logits: -ln(1/4) for the one valid row
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, 4], &device);
        let value: f64 = span_cross_entropy(logits.clone(), targets).into_scalar().elem::<f64>();
        assert!((value - 4f64.ln()).abs() < 1e-5);

        let targets = Tensor::<TestBackend, 1, Int>::from_ints([4, 9], &device);
        let value: f64 = span_cross_entropy(logits, targets).into_scalar().elem::<f64>();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_loss_with_out_of_range_spans_is_finite() {
        let device = Default::default();
        let model: BigBirdQaModel<TestBackend> = tiny_config().init(&device);
        let batcher = NqBatcher::<TestBackend>::new(device).with_threshold(32);
        let batch = batcher.batch(vec![
            NqExample::new(vec![3; 12], -100, -100),
            NqExample::new(vec![5; 20], 4, 40),
        ]);

        let (loss, _) = model.forward_loss(batch);
        let value: f64 = loss.into_scalar().elem::<f64>();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }
}
