// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `inspect`, and all
// their configurable flags.
//
// A handful of flags fall back to environment variables
// (TRAIN_ON_SMALL, NQ_TRACKING, NQ_TRACKING_PROJECT,
// NQ_MODEL_DIR). This is the only place the environment is
// read; everything below gets an explicit RunConfig.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{builder::BoolishValueParser, ArgAction, Args, Subcommand};
use std::path::PathBuf;

use crate::application::config::{
    DataOptions, DeviceKind, ModelOptions, ResumeFrom, RunConfig, TrackingOptions,
    TrainingOptions,
};
use crate::ml::attention::AttentionType;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune a BigBird span model on pre-tokenised Natural Questions
    Train(TrainArgs),

    /// Decode a few training examples to check the preprocessing
    Inspect(InspectArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Pre-tokenised training examples, one JSON object per line
    #[arg(long, default_value = "data/nq-training.jsonl")]
    pub train_file: PathBuf,

    /// Pre-tokenised validation examples
    #[arg(long, default_value = "data/nq-validation.jsonl")]
    pub validation_file: PathBuf,

    /// Train on a small seeded subsample of both splits
    #[arg(long, env = "TRAIN_ON_SMALL", action = ArgAction::SetTrue,
          value_parser = BoolishValueParser::new())]
    pub small: bool,

    #[arg(long, default_value_t = 16_000)]
    pub small_train_size: usize,

    #[arg(long, default_value_t = 2_000)]
    pub small_validation_size: usize,

    /// Directory with config.json, tokenizer.json and optional model.mpk.gz
    #[arg(long, env = "NQ_MODEL_DIR", default_value = "models/bigbird-roberta-base")]
    pub model_dir: PathBuf,

    /// Tokens per attention block
    #[arg(long, default_value_t = 64)]
    pub block_size: usize,

    /// Random key blocks per query block
    #[arg(long, default_value_t = 3)]
    pub num_random_blocks: usize,

    /// block_sparse or original_full
    #[arg(long, default_value = "block_sparse")]
    pub attention_type: AttentionType,

    /// Keep all activations instead of recomputing them in the backward pass
    #[arg(long)]
    pub no_gradient_checkpointing: bool,

    #[arg(long, default_value = "bigbird-nq-output-dir")]
    pub output_dir: PathBuf,

    #[arg(long, default_value = "final-model")]
    pub final_model_dir: PathBuf,

    /// Where the model is saved when training is interrupted
    #[arg(long, default_value = "interrupted-natural-questions")]
    pub interrupted_dir: PathBuf,

    #[arg(long, default_value = "bigbird-nq")]
    pub run_name: String,

    /// Per-device training batch size
    #[arg(long, default_value_t = 4)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 4)]
    pub eval_batch_size: usize,

    /// Mini-batches per optimizer step
    #[arg(long, default_value_t = 4)]
    pub gradient_accumulation_steps: usize,

    /// Initial learning rate, decayed linearly to 0
    #[arg(long, default_value_t = 7e-5)]
    pub lr: f64,

    #[arg(long, default_value_t = 3)]
    pub epochs: usize,

    /// Optimizer steps between loss logs
    #[arg(long, default_value_t = 5)]
    pub logging_steps: usize,

    /// Optimizer steps between checkpoints
    #[arg(long, default_value_t = 300)]
    pub save_steps: usize,

    /// Shuffle uniformly instead of grouping similar lengths
    #[arg(long)]
    pub no_group_by_length: bool,

    #[arg(long, default_value_t = 1.0)]
    pub max_grad_norm: f32,

    /// Minimum padded width of every batch
    #[arg(long, default_value_t = 1024)]
    pub pad_threshold: usize,

    /// Seed for subsampling and batch order
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Resume from this checkpoint directory
    #[arg(long, conflicts_with = "resume_latest")]
    pub resume_from_checkpoint: Option<PathBuf>,

    /// Resume from the newest checkpoint-* in the output directory
    #[arg(long)]
    pub resume_latest: bool,

    /// Record metrics under <output_dir>/tracking
    #[arg(long, env = "NQ_TRACKING", default_value_t = true, action = ArgAction::Set,
          value_parser = BoolishValueParser::new())]
    pub tracking: bool,

    #[arg(long, env = "NQ_TRACKING_PROJECT", default_value = "bigbird-natural-questions")]
    pub tracking_project: String,

    #[arg(long, value_enum, default_value_t = DeviceKind::Wgpu)]
    pub device: DeviceKind,
}

/// Convert CLI TrainArgs into the application-layer RunConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        let resume = match (a.resume_from_checkpoint, a.resume_latest) {
            (Some(dir), _) => ResumeFrom::Checkpoint(dir),
            (None, true) => ResumeFrom::Latest,
            (None, false) => ResumeFrom::Scratch,
        };

        RunConfig {
            data: DataOptions {
                train_path:            a.train_file,
                validation_path:       a.validation_file,
                use_small_subset:      a.small,
                small_train_size:      a.small_train_size,
                small_validation_size: a.small_validation_size,
                seed:                  a.seed,
            },
            model: ModelOptions {
                model_dir:              a.model_dir,
                block_size:             a.block_size,
                num_random_blocks:      a.num_random_blocks,
                attention_type:         a.attention_type,
                gradient_checkpointing: !a.no_gradient_checkpointing,
            },
            training: TrainingOptions {
                output_dir:                  a.output_dir,
                final_model_dir:             a.final_model_dir,
                interrupted_dir:             a.interrupted_dir,
                run_name:                    a.run_name,
                train_batch_size:            a.batch_size,
                eval_batch_size:             a.eval_batch_size,
                gradient_accumulation_steps: a.gradient_accumulation_steps,
                learning_rate:               a.lr,
                num_epochs:                  a.epochs,
                logging_steps:               a.logging_steps,
                save_steps:                  a.save_steps,
                group_by_length:             !a.no_group_by_length,
                max_grad_norm:               a.max_grad_norm,
                pad_threshold:               a.pad_threshold,
                seed:                        a.seed,
                resume,
            },
            tracking: TrackingOptions {
                enabled: a.tracking,
                project: a.tracking_project,
            },
            device: a.device,
        }
    }
}

/// All arguments for the `inspect` command
#[derive(Args, Debug)]
pub struct InspectArgs {
    #[arg(long, default_value = "data/nq-training.jsonl")]
    pub train_file: PathBuf,

    /// Model directory whose tokenizer decodes the ids
    #[arg(long, env = "NQ_MODEL_DIR", default_value = "models/bigbird-roberta-base")]
    pub model_dir: PathBuf,

    /// How many answerable examples to show
    #[arg(long, default_value_t = 5)]
    pub count: usize,

    #[arg(long, default_value_t = 1024)]
    pub pad_threshold: usize,
}
