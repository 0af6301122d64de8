// ============================================================
// Layer 6 — Pretrained Model Directory
// ============================================================
// A pretrained model is identified by a directory:
//
//   <model_dir>/
//     config.json      ← architecture (HuggingFace-style keys)
//     tokenizer.json   ← HuggingFace tokenizers format
//     model.mpk.gz     ← burn weights (optional)
//
// config.json and tokenizer.json are required. Without
// model.mpk.gz the model is randomly initialised and a warning
// is logged, so an architecture can be trained from scratch.
//
// Every checkpoint this program writes uses the same layout,
// so `final-model/` can be passed back in as a model directory.

use anyhow::{anyhow, Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use tokenizers::Tokenizer;

use crate::application::config::ModelOptions;
use crate::data::batcher::DEFAULT_PAD_ID;
use crate::ml::attention::AttentionType;
use crate::ml::model::{BigBirdQaConfig, BigBirdQaModel};

pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
/// Recorder file stem; CompactRecorder appends `.mpk.gz`
pub const WEIGHTS_STEM: &str = "model";

fn default_dropout() -> f64 { 0.1 }

/// Architecture description stored as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PretrainedConfig {
    pub vocab_size:              usize,
    pub max_position_embeddings: usize,
    pub hidden_size:             usize,
    pub num_attention_heads:     usize,
    pub num_hidden_layers:       usize,
    pub intermediate_size:       usize,
    #[serde(default = "default_dropout")]
    pub hidden_dropout_prob:     f64,
    #[serde(default)]
    pub pad_token_id:            Option<u32>,
    #[serde(default)]
    pub block_size:              Option<usize>,
    #[serde(default)]
    pub num_random_blocks:       Option<usize>,
    #[serde(default)]
    pub attention_type:          Option<AttentionType>,
}

impl PretrainedConfig {
    /// Model config with the sparse-attention options of this run applied.
    pub fn to_model_config(&self, opts: &ModelOptions) -> BigBirdQaConfig {
        BigBirdQaConfig::new(
            self.vocab_size,
            self.max_position_embeddings,
            self.hidden_size,
            self.num_attention_heads,
            self.num_hidden_layers,
            self.intermediate_size,
            self.hidden_dropout_prob,
        )
        .with_block_size(opts.block_size)
        .with_num_random_blocks(opts.num_random_blocks)
        .with_attention_type(opts.attention_type)
    }

    /// The config to write next to fine-tuned weights.
    pub fn for_checkpoint(&self, model: &BigBirdQaConfig) -> Self {
        Self {
            block_size:        Some(model.block_size),
            num_random_blocks: Some(model.num_random_blocks),
            attention_type:    Some(model.attention_type),
            ..self.clone()
        }
    }
}

pub struct PretrainedModelDir {
    dir: PathBuf,
}

impl PretrainedModelDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn load_config(&self) -> Result<PretrainedConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!("Cannot read model config '{}'", path.display())
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid model config '{}'", path.display()))
    }

    pub fn load_tokenizer(&self) -> Result<Tokenizer> {
        let path = self.dir.join(TOKENIZER_FILE);
        Tokenizer::from_file(&path)
            .map_err(|e| anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
    }

    pub fn has_weights(&self) -> bool {
        self.dir.join(format!("{WEIGHTS_STEM}.mpk.gz")).exists()
    }

    /// Build the model and restore pretrained weights when present.
    pub fn load_model<B: Backend>(
        &self,
        config: &BigBirdQaConfig,
        device: &B::Device,
    ) -> Result<BigBirdQaModel<B>> {
        config
            .check()
            .map_err(|e| anyhow!("Unusable model config in '{}': {e}", self.dir.display()))?;

        let model: BigBirdQaModel<B> = config.init(device);
        if !self.has_weights() {
            tracing::warn!(
                "No weights found in '{}'; starting from random initialisation",
                self.dir.display()
            );
            return Ok(model);
        }

        let path = self.dir.join(WEIGHTS_STEM);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", path.display()))?;
        tracing::info!("Loaded pretrained weights from '{}'", self.dir.display());
        Ok(model.load_record(record))
    }
}

/// Token id used for padding: config first, then the tokenizer's
/// pad token, then 0.
pub fn resolve_pad_id(config: &PretrainedConfig, tokenizer: &Tokenizer) -> u32 {
    config
        .pad_token_id
        .or_else(|| tokenizer.token_to_id("<pad>"))
        .or_else(|| tokenizer.token_to_id("[PAD]"))
        .unwrap_or(DEFAULT_PAD_ID)
}

/// Separator between question and context, if the tokenizer has one.
pub fn resolve_sep_id(tokenizer: &Tokenizer) -> Option<u32> {
    tokenizer
        .token_to_id("[SEP]")
        .or_else(|| tokenizer.token_to_id("</s>"))
}

// ─── Test Fixtures ────────────────────────────────────────────────────────────
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Word-level tokenizer with ids:
    /// [PAD]=0 [UNK]=1 [CLS]=2 [SEP]=3, then "w4".."w49"
    pub fn tiny_tokenizer_json() -> String {
        let mut vocab = serde_json::json!({
            "[PAD]": 0, "[UNK]": 1, "[CLS]": 2, "[SEP]": 3,
        });
        for id in 4..50 {
            vocab[format!("w{id}")] = serde_json::json!(id);
        }
        serde_json::json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {"id": 0, "content": "[PAD]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 1, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 2, "content": "[CLS]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
                {"id": 3, "content": "[SEP]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
            ],
            "normalizer": null,
            "pre_tokenizer": {"type": "Whitespace"},
            "post_processor": null,
            "decoder": null,
            "model": {"type": "WordLevel", "vocab": vocab, "unk_token": "[UNK]"}
        })
        .to_string()
    }

    pub fn tiny_config() -> PretrainedConfig {
        PretrainedConfig {
            vocab_size:              50,
            max_position_embeddings: 64,
            hidden_size:             16,
            num_attention_heads:     2,
            num_hidden_layers:       1,
            intermediate_size:       32,
            hidden_dropout_prob:     0.0,
            pad_token_id:            None,
            block_size:              None,
            num_random_blocks:       None,
            attention_type:          None,
        }
    }

    /// Writes config.json + tokenizer.json (no weights) into `dir`.
    pub fn write_tiny_model_dir(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(&tiny_config()).unwrap(),
        )
        .unwrap();
        fs::write(dir.join(TOKENIZER_FILE), tiny_tokenizer_json()).unwrap();
    }
}
