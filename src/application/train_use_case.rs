// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full fine-tuning pipeline in order:
//
//   Step 1: Load both JSONL splits         (Layer 4 - data)
//   Step 2: Optional seeded subsample      (Layer 4 - data)
//   Step 3: Drop answerless examples       (Layer 4 - data)
//   Step 4: Load config + tokenizer        (Layer 6 - infra)
//   Step 5: Check lengths fit the model    (Layer 2)
//   Step 6: Save run_config.json           (Layer 2)
//   Step 7: Open the tracking run          (Layer 6 - infra)
//   Step 8: Run training loop              (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Context, Result};
use std::fs;

use crate::application::config::{DataOptions, RunConfig};
use crate::data::dataset::NqDataset;
use crate::data::loader::JsonlExampleSource;
use crate::data::sampler::{filter_answerless, subsample};
use crate::domain::traits::{ExampleSource, ExperimentTracker};
use crate::infra::checkpoint::RUN_CONFIG_FILE;
use crate::infra::interrupt::{install_interrupt_handler, StopFlag};
use crate::infra::metrics::{CsvTracker, NoopTracker};
use crate::infra::pretrained::{resolve_pad_id, PretrainedModelDir};
use crate::ml::trainer::{run_training, RunOutcome, TrainingInputs};

/// Training and validation examples, ready for the trainer.
pub struct PreparedSplits {
    pub train: NqDataset,
    pub valid: NqDataset,
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Install the Ctrl-C handler and run the pipeline.
    pub fn execute(&self) -> Result<RunOutcome> {
        let stop = install_interrupt_handler()?;
        self.execute_with(stop)
    }

    /// Run the pipeline with a caller-owned stop flag.
    pub fn execute_with(&self, stop: StopFlag) -> Result<RunOutcome> {
        let cfg = &self.config;

        // ── Steps 1–3: Load, subsample, filter ───────────────────────────────
        let splits = load_splits(&cfg.data)?;

        // ── Step 4: Pretrained config and tokenizer ──────────────────────────
        let model_dir = PretrainedModelDir::new(&cfg.model.model_dir);
        let pretrained = model_dir.load_config()?;
        let tokenizer = model_dir.load_tokenizer()?;
        let pad_id = resolve_pad_id(&pretrained, &tokenizer);
        let model_config = pretrained.to_model_config(&cfg.model);
        tracing::info!(
            "Model directory '{}' (vocab={}, max_positions={}, pad_id={})",
            model_dir.path().display(),
            pretrained.vocab_size,
            pretrained.max_position_embeddings,
            pad_id,
        );

        // ── Step 5: Every batch must fit the position table ──────────────────
        if cfg.training.pad_threshold > pretrained.max_position_embeddings {
            bail!(
                "pad threshold {} is larger than the model's {} positions",
                cfg.training.pad_threshold,
                pretrained.max_position_embeddings
            );
        }
        check_lengths("training", &splits.train, pretrained.max_position_embeddings)?;
        check_lengths("validation", &splits.valid, pretrained.max_position_embeddings)?;

        // ── Step 6: Persist the run configuration ────────────────────────────
        let run_config = serde_json::to_string_pretty(cfg)?;
        let out = &cfg.training.output_dir;
        fs::create_dir_all(out)
            .with_context(|| format!("Cannot create output directory '{}'", out.display()))?;
        fs::write(out.join(RUN_CONFIG_FILE), &run_config)
            .with_context(|| format!("Cannot write '{}'", out.join(RUN_CONFIG_FILE).display()))?;

        // ── Step 7: Tracking ─────────────────────────────────────────────────
        let tracker: Box<dyn ExperimentTracker> = if cfg.tracking.enabled {
            Box::new(CsvTracker::new(
                out.join("tracking"),
                &cfg.tracking.project,
                &cfg.training.run_name,
            )?)
        } else {
            tracing::info!("Experiment tracking disabled");
            Box::new(NoopTracker)
        };

        // ── Step 8: Train ────────────────────────────────────────────────────
        run_training(
            cfg,
            TrainingInputs {
                train_set: splits.train,
                valid_set: splits.valid,
                model_dir,
                pretrained,
                model_config,
                tokenizer,
                pad_id,
                tracker,
                stop,
                run_config,
            },
        )
    }
}

/// Load both splits, apply the small-subset switch, drop answerless examples.
pub fn load_splits(data: &DataOptions) -> Result<PreparedSplits> {
    let train = JsonlExampleSource::new(&data.train_path).load_all()?;
    let valid = JsonlExampleSource::new(&data.validation_path).load_all()?;
    tracing::info!("Loaded {} training and {} validation examples", train.len(), valid.len());

    let (train, valid) = if data.use_small_subset {
        tracing::info!(
            "Using a small subset: {} training, {} validation (seed {})",
            data.small_train_size, data.small_validation_size, data.seed
        );
        (
            subsample(&train, data.small_train_size, data.seed),
            subsample(&valid, data.small_validation_size, data.seed),
        )
    } else {
        (train, valid)
    };

    let train = filter_answerless(train);
    let valid = filter_answerless(valid);
    tracing::info!("After filtering: {} training, {} validation examples", train.len(), valid.len());

    if train.is_empty() {
        bail!("No answerable training examples in '{}'", data.train_path.display());
    }
    if valid.is_empty() {
        bail!("No answerable validation examples in '{}'", data.validation_path.display());
    }

    Ok(PreparedSplits { train: NqDataset::new(train), valid: NqDataset::new(valid) })
}

fn check_lengths(split: &str, dataset: &NqDataset, max_positions: usize) -> Result<()> {
    let too_long = dataset
        .examples()
        .iter()
        .enumerate()
        .find(|(_, ex)| ex.len() > max_positions);

    if let Some((idx, ex)) = too_long {
        bail!(
            "{split} example {idx} has {} tokens, more than the model's {} positions",
            ex.len(),
            max_positions
        );
    }
    tracing::debug!("Longest {split} example: {} tokens", dataset.max_len());
    Ok(())
}
