// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores training state using Burn's CompactRecorder.
//
// Every saved directory is a loadable model directory:
//
//   <dir>/
//     model.mpk.gz        ← model weights
//     config.json         ← architecture + sparse-attention settings
//     tokenizer.json      ← tokenizer the weights were trained with
//
// Periodic checkpoints add what is needed to resume:
//
//   <output_dir>/checkpoint-<step>/
//     ...                 ← everything above
//     optimizer.mpk.gz    ← Adam moment estimates
//     trainer_state.json  ← global step, epochs done, eval history
//     run_config.json     ← the run's full configuration
//
// Burn's CompactRecorder:
//   - Serialises records to MessagePack format
//   - Compresses with gzip
//   - Stores floats in half precision
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{anyhow, Context, Result};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use tokenizers::Tokenizer;

use crate::domain::metrics::EvalLog;
use crate::infra::pretrained::{PretrainedConfig, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_STEM};
use crate::ml::model::BigBirdQaModel;

pub const OPTIMIZER_STEM: &str = "optimizer";
pub const TRAINER_STATE_FILE: &str = "trainer_state.json";
pub const RUN_CONFIG_FILE: &str = "run_config.json";
pub const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Progress counters persisted with every checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainerState {
    /// Optimizer steps taken so far
    pub global_step: usize,

    /// Full epochs finished
    pub epochs_completed: usize,

    /// Lowest validation loss seen so far
    pub best_eval_loss: Option<f64>,

    /// Every evaluation, in order
    pub eval_history: Vec<EvalLog>,
}

/// Writes model directories and resumable checkpoints.
pub struct CheckpointManager {
    output_dir: PathBuf,
    config:     PretrainedConfig,
    tokenizer:  Tokenizer,
    run_config: String,
}

impl CheckpointManager {
    /// `config` is written as `config.json` into every saved directory,
    /// `run_config` (JSON) into every resumable checkpoint.
    pub fn new(
        output_dir: impl Into<PathBuf>,
        config:     PretrainedConfig,
        tokenizer:  Tokenizer,
        run_config: String,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).with_context(|| {
            format!("Cannot create output directory '{}'", output_dir.display())
        })?;
        Ok(Self { output_dir, config, tokenizer, run_config })
    }

    /// `{output_dir}/checkpoint-{step}`
    pub fn checkpoint_dir(&self, step: usize) -> PathBuf {
        self.output_dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Save weights, config and tokenizer into `dir`.
    pub fn save_model<B: Backend>(&self, dir: &Path, model: &BigBirdQaModel<B>) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create '{}'", dir.display()))?;

        let path = dir.join(WEIGHTS_STEM);
        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save weights to '{}'", path.display()))?;

        let config_path = dir.join(CONFIG_FILE);
        fs::write(&config_path, serde_json::to_string_pretty(&self.config)?)
            .with_context(|| format!("Cannot write '{}'", config_path.display()))?;

        let tok_path = dir.join(TOKENIZER_FILE);
        self.tokenizer
            .save(&tok_path, true)
            .map_err(|e| anyhow!("Cannot write tokenizer '{}': {e}", tok_path.display()))?;

        tracing::debug!("Saved model to '{}'", dir.display());
        Ok(())
    }

    /// Save a resumable checkpoint to `{output_dir}/checkpoint-{step}`.
    pub fn save_checkpoint<B, O>(
        &self,
        model: &BigBirdQaModel<B>,
        optim: &O,
        state: &TrainerState,
    ) -> Result<PathBuf>
    where
        B: AutodiffBackend,
        O: Optimizer<BigBirdQaModel<B>, B>,
    {
        let dir = self.checkpoint_dir(state.global_step);
        self.save_checkpoint_in(&dir, model, optim, state)?;
        Ok(dir)
    }

    /// Save a resumable checkpoint into an explicit directory.
    pub fn save_checkpoint_in<B, O>(
        &self,
        dir:   &Path,
        model: &BigBirdQaModel<B>,
        optim: &O,
        state: &TrainerState,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<BigBirdQaModel<B>, B>,
    {
        self.save_model(dir, model)?;

        let optim_path = dir.join(OPTIMIZER_STEM);
        CompactRecorder::new()
            .record(optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        fs::write(dir.join(TRAINER_STATE_FILE), serde_json::to_string_pretty(state)?)
            .with_context(|| "Failed to write trainer_state.json")?;
        fs::write(dir.join(RUN_CONFIG_FILE), &self.run_config)
            .with_context(|| "Failed to write run_config.json")?;

        tracing::info!("Saved checkpoint '{}'", dir.display());
        Ok(())
    }

    /// Restore model, optimizer and trainer state from a checkpoint directory.
    pub fn load_checkpoint<B, O>(
        &self,
        dir:    &Path,
        model:  BigBirdQaModel<B>,
        optim:  O,
        device: &B::Device,
    ) -> Result<(BigBirdQaModel<B>, O, TrainerState)>
    where
        B: AutodiffBackend,
        O: Optimizer<BigBirdQaModel<B>, B>,
    {
        let model_path = dir.join(WEIGHTS_STEM);
        let model_record = CompactRecorder::new()
            .load(model_path.clone(), device)
            .with_context(|| format!("Cannot load weights '{}'", model_path.display()))?;
        let model = model.load_record(model_record);

        let optim_path = dir.join(OPTIMIZER_STEM);
        let optim_record = CompactRecorder::new()
            .load(optim_path.clone(), device)
            .with_context(|| format!("Cannot load optimizer '{}'", optim_path.display()))?;
        let optim = optim.load_record(optim_record);

        let state = load_trainer_state(dir)?;
        tracing::info!(
            "Resumed from '{}' at step {} ({} epochs done)",
            dir.display(),
            state.global_step,
            state.epochs_completed
        );
        Ok((model, optim, state))
    }
}

pub fn load_trainer_state(dir: &Path) -> Result<TrainerState> {
    let path = dir.join(TRAINER_STATE_FILE);
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    Ok(serde_json::from_str(&json)?)
}

/// Highest-numbered `checkpoint-<step>` directory under `output_dir`.
pub fn latest_checkpoint(output_dir: &Path) -> Result<Option<PathBuf>> {
    if !output_dir.exists() {
        return Ok(None);
    }

    let mut best: Option<(usize, PathBuf)> = None;
    for entry in fs::read_dir(output_dir)
        .with_context(|| format!("Cannot read directory '{}'", output_dir.display()))?
    {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let step = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(CHECKPOINT_PREFIX))
            .and_then(|s| s.parse::<usize>().ok());
        if let Some(step) = step {
            if best.as_ref().map_or(true, |(b, _)| step > *b) {
                best = Some((step, path));
            }
        }
    }
    Ok(best.map(|(_, p)| p))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::pretrained::fixtures::{tiny_config, tiny_tokenizer_json};
    use crate::infra::pretrained::PretrainedModelDir;

    #[test]
    fn test_latest_checkpoint_picks_highest_step() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["checkpoint-300", "checkpoint-1200", "checkpoint-900", "final-model"] {
            fs::create_dir_all(tmp.path().join(name)).unwrap();
        }
        fs::write(tmp.path().join("checkpoint-5000"), "not a dir").unwrap();

        let latest = latest_checkpoint(tmp.path()).unwrap().unwrap();
        assert!(latest.ends_with("checkpoint-1200"));
    }

    #[test]
    fn test_latest_checkpoint_none_when_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(latest_checkpoint(tmp.path()).unwrap().is_none());
        assert!(latest_checkpoint(&tmp.path().join("nope")).unwrap().is_none());
    }

    #[test]
    fn test_saved_model_dir_is_a_model_dir() {
        use burn::backend::NdArray;
        use crate::application::config::ModelOptions;

        let tmp = tempfile::tempdir().unwrap();
        let tokenizer: Tokenizer = tiny_tokenizer_json().parse().unwrap();
        let opts = ModelOptions { block_size: 4, num_random_blocks: 1, ..ModelOptions::default() };
        let model_cfg = tiny_config().to_model_config(&opts);
        let ckpt = CheckpointManager::new(
            tmp.path().join("out"),
            tiny_config().for_checkpoint(&model_cfg),
            tokenizer,
            "{}".to_string(),
        )
        .unwrap();

        let device = Default::default();
        let model: BigBirdQaModel<NdArray> = model_cfg.init(&device);
        let dir = tmp.path().join("final-model");
        ckpt.save_model(&dir, &model).unwrap();

        let reloaded = PretrainedModelDir::new(&dir);
        assert!(reloaded.has_weights());
        let cfg = reloaded.load_config().unwrap();
        assert_eq!(cfg.block_size, Some(4));
        assert!(reloaded.load_tokenizer().is_ok());
    }

    #[test]
    fn test_trainer_state_json_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let state = TrainerState {
            global_step: 600,
            epochs_completed: 1,
            best_eval_loss: Some(1.25),
            eval_history: vec![EvalLog {
                step: 600, epoch: 1.0, loss: 1.25, start_acc: 0.5, end_acc: 0.25, samples: 8,
            }],
        };
        fs::write(tmp.path().join(TRAINER_STATE_FILE), serde_json::to_string(&state).unwrap()).unwrap();
        assert_eq!(load_trainer_state(tmp.path()).unwrap(), state);
    }
}
