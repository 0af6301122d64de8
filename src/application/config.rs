// ============================================================
// Layer 2 — Run Configuration
// ============================================================
// Every option of a fine-tuning run in one serialisable value.
// The CLI builds it (flags, with environment-variable
// fallbacks); nothing below the CLI reads the environment.
//
// Saved as run_config.json in the output directory and in
// every checkpoint, so a run can be reproduced exactly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::batcher::PAD_THRESHOLD;
use crate::ml::attention::AttentionType;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub data:     DataOptions,
    pub model:    ModelOptions,
    pub training: TrainingOptions,
    pub tracking: TrackingOptions,
    pub device:   DeviceKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataOptions {
    pub train_path:            PathBuf,
    pub validation_path:       PathBuf,
    /// Draw a small seeded subsample of each split before filtering
    pub use_small_subset:      bool,
    pub small_train_size:      usize,
    pub small_validation_size: usize,
    pub seed:                  u64,
}

impl Default for DataOptions {
    fn default() -> Self {
        Self {
            train_path:            PathBuf::from("data/nq-training.jsonl"),
            validation_path:       PathBuf::from("data/nq-validation.jsonl"),
            use_small_subset:      false,
            small_train_size:      16_000,
            small_validation_size: 2_000,
            seed:                  42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Directory with config.json, tokenizer.json and optional model.mpk.gz
    pub model_dir:              PathBuf,
    pub block_size:             usize,
    pub num_random_blocks:      usize,
    pub attention_type:         AttentionType,
    pub gradient_checkpointing: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            model_dir:              PathBuf::from("models/bigbird-roberta-base"),
            block_size:             64,
            num_random_blocks:      3,
            attention_type:         AttentionType::BlockSparse,
            gradient_checkpointing: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeFrom {
    /// Start from the pretrained weights
    #[default]
    Scratch,
    /// Highest-numbered checkpoint in the output directory
    Latest,
    /// A specific checkpoint directory
    Checkpoint(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOptions {
    pub output_dir:                  PathBuf,
    pub final_model_dir:             PathBuf,
    pub interrupted_dir:             PathBuf,
    pub run_name:                    String,
    pub train_batch_size:            usize,
    pub eval_batch_size:             usize,
    pub gradient_accumulation_steps: usize,
    pub learning_rate:               f64,
    pub num_epochs:                  usize,
    /// Optimizer steps between training-loss logs
    pub logging_steps:               usize,
    /// Optimizer steps between checkpoints
    pub save_steps:                  usize,
    pub group_by_length:             bool,
    pub max_grad_norm:               f32,
    pub pad_threshold:               usize,
    pub seed:                        u64,
    pub resume:                      ResumeFrom,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            output_dir:                  PathBuf::from("bigbird-nq-output-dir"),
            final_model_dir:             PathBuf::from("final-model"),
            interrupted_dir:             PathBuf::from("interrupted-natural-questions"),
            run_name:                    "bigbird-nq".to_string(),
            train_batch_size:            4,
            eval_batch_size:             4,
            gradient_accumulation_steps: 4,
            learning_rate:               7e-5,
            num_epochs:                  3,
            logging_steps:               5,
            save_steps:                  300,
            group_by_length:             true,
            max_grad_norm:               1.0,
            pad_threshold:               PAD_THRESHOLD,
            seed:                        42,
            resume:                      ResumeFrom::Scratch,
        }
    }
}

impl TrainingOptions {
    /// Examples consumed per optimizer step
    pub fn effective_batch_size(&self) -> usize {
        self.train_batch_size * self.gradient_accumulation_steps
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingOptions {
    pub enabled: bool,
    pub project: String,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self { enabled: true, project: "bigbird-natural-questions".to_string() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// GPU through wgpu
    #[default]
    Wgpu,
    /// CPU through ndarray
    Cpu,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let cfg = RunConfig::default();
        assert_eq!(cfg.training.effective_batch_size(), 16);
        assert_eq!(cfg.training.pad_threshold, 1024);
        assert_eq!(cfg.data.small_train_size, 16_000);
        assert_eq!(cfg.model.attention_type, AttentionType::BlockSparse);
        assert!(cfg.tracking.enabled);
    }

    #[test]
    fn test_json_round_trip_keeps_resume_target() {
        let mut cfg = RunConfig::default();
        cfg.training.resume = ResumeFrom::Checkpoint(PathBuf::from("out/checkpoint-300"));
        let json = serde_json::to_string(&cfg).unwrap();
        let back: RunConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.training.resume, cfg.training.resume);
        assert_eq!(back.device, DeviceKind::Wgpu);
    }
}
