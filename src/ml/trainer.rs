// ============================================================
// Layer 5 — Training Driver
// ============================================================
// Train + evaluate loop using Burn's DataLoader and Adam.
//
// One optimizer step = gradient_accumulation_steps mini-batches:
//   loss_i / accum → backward → accumulate
//   then a single Adam update with a linearly decaying rate.
//
// Cadence (in optimizer steps):
//   every logging_steps → mean loss since last log
//   every save_steps    → output_dir/checkpoint-<step>
//   end of every epoch  → validation loss and span accuracy
//
// The session owns the model between steps, so whatever way
// the loop ends it still has the latest weights:
//   finished     → final_model_dir
//   Ctrl-C       → interrupted_dir
//   error/panic  → interrupted_dir, then the failure propagates
//
// Burn notes:
//   - Training uses B (Autodiff<...>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - argmax(1) returns [batch,1] so we flatten before .equal()
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::{bail, Result};
use burn::{
    backend::{
        autodiff::checkpoint::strategy::BalancedCheckpointing,
        ndarray::NdArrayDevice,
        wgpu::WgpuDevice,
        Autodiff, NdArray, Wgpu,
    },
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsAccumulator, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tokenizers::Tokenizer;

use crate::application::config::{DeviceKind, ResumeFrom, RunConfig, TrainingOptions};
use crate::data::batcher::NqBatcher;
use crate::data::dataset::NqDataset;
use crate::data::sampler::{length_grouped_indices, shuffled_indices};
use crate::domain::metrics::{EvalLog, TrainLog};
use crate::domain::traits::ExperimentTracker;
use crate::infra::checkpoint::{latest_checkpoint, CheckpointManager, TrainerState};
use crate::infra::interrupt::StopFlag;
use crate::infra::pretrained::{PretrainedConfig, PretrainedModelDir};
use crate::ml::model::{span_cross_entropy, BigBirdQaConfig, BigBirdQaModel};
use crate::ml::schedule::LinearSchedule;

/// How a training run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All epochs done; model saved to final_model_dir
    Completed,
    /// Stopped by Ctrl-C; model saved to interrupted_dir
    Interrupted,
}

/// Everything the driver needs besides the run config.
pub struct TrainingInputs {
    pub train_set:    NqDataset,
    pub valid_set:    NqDataset,
    pub model_dir:    PretrainedModelDir,
    pub pretrained:   PretrainedConfig,
    pub model_config: BigBirdQaConfig,
    pub tokenizer:    Tokenizer,
    pub pad_id:       u32,
    pub tracker:      Box<dyn ExperimentTracker>,
    pub stop:         StopFlag,
    /// RunConfig as JSON, copied into every checkpoint
    pub run_config:   String,
}

/// Pick the backend from the config and run.
pub fn run_training(cfg: &RunConfig, inputs: TrainingInputs) -> Result<RunOutcome> {
    match (cfg.device, cfg.model.gradient_checkpointing) {
        (DeviceKind::Wgpu, true) => {
            train_on::<Autodiff<Wgpu, BalancedCheckpointing>>(cfg, inputs, WgpuDevice::default())
        }
        (DeviceKind::Wgpu, false) => {
            train_on::<Autodiff<Wgpu>>(cfg, inputs, WgpuDevice::default())
        }
        (DeviceKind::Cpu, true) => {
            train_on::<Autodiff<NdArray, BalancedCheckpointing>>(cfg, inputs, NdArrayDevice::Cpu)
        }
        (DeviceKind::Cpu, false) => {
            train_on::<Autodiff<NdArray>>(cfg, inputs, NdArrayDevice::Cpu)
        }
    }
}

/// Build model, optimizer and checkpoint manager on backend `B`,
/// restore a checkpoint if asked to, then train.
pub fn train_on<B: AutodiffBackend>(
    cfg:    &RunConfig,
    inputs: TrainingInputs,
    device: B::Device,
) -> Result<RunOutcome> {
    let opts = &cfg.training;
    tracing::info!("Using device: {:?}", device);

    let max_positions = inputs.model_config.max_position_embeddings;
    if opts.pad_threshold > max_positions {
        bail!(
            "pad threshold {} exceeds the model's {} position embeddings",
            opts.pad_threshold,
            max_positions
        );
    }
    let longest = inputs.train_set.max_len().max(inputs.valid_set.max_len());
    if longest > max_positions {
        bail!(
            "longest example has {} tokens but the model has {} position embeddings",
            longest,
            max_positions
        );
    }

    let model: BigBirdQaModel<B> = inputs.model_dir.load_model(&inputs.model_config, &device)?;
    tracing::info!(
        "Model ready: {} layers, hidden={}, attention={:?}, block_size={}, random_blocks={}",
        inputs.model_config.num_hidden_layers,
        inputs.model_config.hidden_size,
        inputs.model_config.attention_type,
        inputs.model_config.block_size,
        inputs.model_config.num_random_blocks,
    );

    let optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(opts.max_grad_norm)))
        .init::<B, BigBirdQaModel<B>>();

    let checkpoints = CheckpointManager::new(
        &opts.output_dir,
        inputs.pretrained.for_checkpoint(&inputs.model_config),
        inputs.tokenizer,
        inputs.run_config,
    )?;

    let (model, optim, state) = match resolve_resume(opts)? {
        Some(dir) => checkpoints.load_checkpoint(&dir, model, optim, &device)?,
        None => (model, optim, TrainerState::default()),
    };

    let total_steps = steps_per_epoch(
        inputs.train_set.example_count(),
        opts.train_batch_size,
        opts.gradient_accumulation_steps,
    ) * opts.num_epochs;

    let mut session = TrainingSession {
        model,
        optim,
        state,
        opts: opts.clone(),
        schedule: LinearSchedule::new(opts.learning_rate, total_steps),
        train_set: inputs.train_set,
        valid_set: inputs.valid_set,
        pad_id: inputs.pad_id,
        device,
        checkpoints,
        tracker: inputs.tracker,
        stop: inputs.stop,
    };
    session.train()
}

/// Optimizer steps in one pass over `examples` training examples
pub fn steps_per_epoch(examples: usize, batch_size: usize, accumulation: usize) -> usize {
    examples.div_ceil(batch_size.max(1)).div_ceil(accumulation.max(1))
}

fn resolve_resume(opts: &TrainingOptions) -> Result<Option<PathBuf>> {
    match &opts.resume {
        ResumeFrom::Scratch => Ok(None),
        ResumeFrom::Checkpoint(dir) => Ok(Some(dir.clone())),
        ResumeFrom::Latest => match latest_checkpoint(&opts.output_dir)? {
            Some(dir) => Ok(Some(dir)),
            None => bail!(
                "No checkpoint-* directory found in '{}' to resume from",
                opts.output_dir.display()
            ),
        },
    }
}

// ─── TrainingSession ──────────────────────────────────────────────────────────
pub struct TrainingSession<B: AutodiffBackend, O> {
    model:       BigBirdQaModel<B>,
    optim:       O,
    state:       TrainerState,
    opts:        TrainingOptions,
    schedule:    LinearSchedule,
    train_set:   NqDataset,
    valid_set:   NqDataset,
    pad_id:      u32,
    device:      B::Device,
    checkpoints: CheckpointManager,
    tracker:     Box<dyn ExperimentTracker>,
    stop:        StopFlag,
}

impl<B, O> TrainingSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<BigBirdQaModel<B>, B>,
{
    fn accumulation(&self) -> usize {
        self.opts.gradient_accumulation_steps.max(1)
    }

    /// Run the loop and save the model however it ends.
    pub fn train(&mut self) -> Result<RunOutcome> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run()));

        let outcome = match result {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => {
                tracing::error!("Training failed at step {}: {err:#}", self.state.global_step);
                self.save_after_failure();
                return Err(err);
            }
            Err(payload) => {
                tracing::error!("Training panicked at step {}", self.state.global_step);
                self.save_after_failure();
                panic::resume_unwind(payload);
            }
        };

        match outcome {
            RunOutcome::Completed => {
                self.checkpoints.save_model(&self.opts.final_model_dir, &self.model)?;
                tracing::info!("Final model saved to '{}'", self.opts.final_model_dir.display());
            }
            RunOutcome::Interrupted => {
                self.save_interrupted()?;
            }
        }
        self.tracker.finish()?;
        Ok(outcome)
    }

    fn save_interrupted(&self) -> Result<()> {
        self.checkpoints.save_checkpoint_in(
            &self.opts.interrupted_dir,
            &self.model,
            &self.optim,
            &self.state,
        )?;
        tracing::warn!(
            "Interrupted at step {}; checkpoint saved to '{}'",
            self.state.global_step,
            self.opts.interrupted_dir.display()
        );
        Ok(())
    }

    fn save_after_failure(&mut self) {
        if let Err(e) = self.save_interrupted() {
            tracing::error!("Could not save interrupted checkpoint: {e:#}");
        }
        if let Err(e) = self.tracker.finish() {
            tracing::error!("Could not finish tracking run: {e:#}");
        }
    }

    fn epoch_order(&self, lengths: &[usize], epoch: usize) -> Vec<usize> {
        let seed = self.opts.seed + epoch as u64;
        if self.opts.group_by_length {
            length_grouped_indices(lengths, self.opts.train_batch_size, seed)
        } else {
            shuffled_indices(lengths.len(), seed)
        }
    }

    fn run(&mut self) -> Result<RunOutcome> {
        let batch_size = self.opts.train_batch_size.max(1);
        let accum = self.accumulation();
        let steps_per_epoch = steps_per_epoch(self.train_set.example_count(), batch_size, accum);
        if steps_per_epoch == 0 {
            bail!("Training set is empty after filtering");
        }

        tracing::info!(
            "Training {} examples | batch size {} x {} accumulation = {} per step | {} steps per epoch | {} steps total",
            self.train_set.example_count(),
            batch_size,
            accum,
            batch_size * accum,
            steps_per_epoch,
            self.schedule.total_steps(),
        );

        let start_epoch = self.state.global_step / steps_per_epoch;
        let skip_examples = (self.state.global_step % steps_per_epoch) * accum * batch_size;
        let lengths = self.train_set.lengths();
        let batcher = NqBatcher::<B>::new(self.device.clone())
            .with_pad_id(self.pad_id)
            .with_threshold(self.opts.pad_threshold);

        let mut log_loss_sum = 0.0f64;
        let mut log_steps = 0usize;

        for epoch in start_epoch..self.opts.num_epochs {
            let mut order = self.epoch_order(&lengths, epoch);
            if epoch == start_epoch && skip_examples > 0 {
                tracing::info!("Skipping {} examples already seen in epoch {}", skip_examples, epoch + 1);
                order.drain(..skip_examples.min(order.len()));
            }
            let num_batches = order.len().div_ceil(batch_size);

            let loader = DataLoaderBuilder::new(batcher.clone())
                .batch_size(batch_size)
                .build(self.train_set.ordered(order));

            let mut accumulator = GradientsAccumulator::<BigBirdQaModel<B>>::new();
            let mut pending = 0usize;
            let mut step_loss = 0.0f64;
            // a save due on the epoch's last step waits for its evaluation
            let mut save_at_epoch_end = false;

            for (i, batch) in loader.iter().enumerate() {
                if self.stop.is_raised() {
                    return Ok(RunOutcome::Interrupted);
                }

                let (loss, _) = self.model.forward_loss(batch);
                let loss = loss / accum as f64;
                step_loss += loss.clone().into_scalar().elem::<f64>();

                let grads = GradientsParams::from_grads(loss.backward(), &self.model);
                accumulator.accumulate(&self.model, grads);
                pending += 1;

                if pending < accum && i + 1 < num_batches {
                    continue;
                }

                // ── Optimizer step ────────────────────────────────────────────
                let lr = self.schedule.lr_at(self.state.global_step);
                self.model = self.optim.step(lr, self.model.clone(), accumulator.grads());
                self.state.global_step += 1;
                pending = 0;

                log_loss_sum += step_loss;
                log_steps += 1;
                step_loss = 0.0;

                let step = self.state.global_step;
                if self.opts.logging_steps > 0 && step % self.opts.logging_steps == 0 {
                    let log = TrainLog {
                        step,
                        epoch: step as f64 / steps_per_epoch as f64,
                        loss: log_loss_sum / log_steps as f64,
                        learning_rate: lr,
                    };
                    tracing::info!(
                        "step {:>6} | epoch {:.2} | loss={:.4} | lr={:.3e}",
                        log.step, log.epoch, log.loss, log.learning_rate
                    );
                    self.tracker.log_train(&log)?;
                    log_loss_sum = 0.0;
                    log_steps = 0;
                }

                if self.opts.save_steps > 0 && step % self.opts.save_steps == 0 {
                    if i + 1 == num_batches {
                        save_at_epoch_end = true;
                    } else {
                        self.checkpoints.save_checkpoint(&self.model, &self.optim, &self.state)?;
                    }
                }
            }

            // ── Validation phase ──────────────────────────────────────────────
            let eval = self.evaluate((epoch + 1) as f64)?;
            tracing::info!(
                "Epoch {:>3}/{} | step {} | val_loss={:.4} | start_acc={:.1}% | end_acc={:.1}%",
                epoch + 1, self.opts.num_epochs, eval.step, eval.loss,
                eval.start_acc * 100.0, eval.end_acc * 100.0,
            );
            self.tracker.log_eval(&eval)?;

            if self.state.best_eval_loss.map_or(true, |best| eval.is_improvement(best)) {
                self.state.best_eval_loss = Some(eval.loss);
            }
            self.state.eval_history.push(eval);
            self.state.epochs_completed = epoch + 1;

            if save_at_epoch_end {
                self.checkpoints.save_checkpoint(&self.model, &self.optim, &self.state)?;
            }
        }

        tracing::info!("Training complete!");
        Ok(RunOutcome::Completed)
    }

    /// Mean loss and exact-match span accuracy over the validation set.
    ///
    /// Accuracy is taken over targets inside their example; ignored
    /// targets count towards neither side.
    pub fn evaluate(&self, epoch: f64) -> Result<EvalLog> {
        // model.valid() → BigBirdQaModel<B::InnerBackend>, dropout disabled
        let model_valid = self.model.valid();
        let batcher = NqBatcher::<B::InnerBackend>::new(self.device.clone())
            .with_pad_id(self.pad_id)
            .with_threshold(self.opts.pad_threshold);
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.opts.eval_batch_size.max(1))
            .build(self.valid_set.ordered((0..self.valid_set.example_count()).collect()));

        let mut loss_sum      = 0.0f64;
        let mut batches       = 0usize;
        let mut correct_start = 0usize;
        let mut correct_end   = 0usize;
        let mut valid_start   = 0usize;
        let mut valid_end     = 0usize;
        let mut total         = 0usize;

        for batch in loader.iter() {
            let [batch_size, width] = batch.input_ids.dims();
            let output = model_valid.forward(batch.input_ids, batch.attention_mask);

            let s_loss = span_cross_entropy(output.start_logits.clone(), batch.start_positions.clone());
            let e_loss = span_cross_entropy(output.end_logits.clone(), batch.end_positions.clone());
            loss_sum += ((s_loss + e_loss) / 2.0_f64).into_scalar().elem::<f64>();
            batches  += 1;
            total    += batch_size;

            let count_valid = |t: &Tensor<B::InnerBackend, 1, Int>| {
                t.clone().lower_elem(width as i64).int().sum().into_scalar().elem::<i64>() as usize
            };
            valid_start += count_valid(&batch.start_positions);
            valid_end   += count_valid(&batch.end_positions);

            // argmax < width, so an ignored target never matches
            let pred_start = output.start_logits.argmax(1).flatten::<1>(0, 1);
            let pred_end   = output.end_logits.argmax(1).flatten::<1>(0, 1);

            let s_correct: i64 = pred_start
                .equal(batch.start_positions)
                .int().sum().into_scalar().elem::<i64>();
            let e_correct: i64 = pred_end
                .equal(batch.end_positions)
                .int().sum().into_scalar().elem::<i64>();
            correct_start += s_correct as usize;
            correct_end   += e_correct as usize;
        }

        Ok(EvalLog {
            step:      self.state.global_step,
            epoch,
            loss:      if batches > 0 { loss_sum / batches as f64 } else { f64::NAN },
            start_acc: if valid_start > 0 { correct_start as f64 / valid_start as f64 } else { 0.0 },
            end_acc:   if valid_end > 0 { correct_end as f64 / valid_end as f64 } else { 0.0 },
            samples:   total,
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config::ModelOptions;
    use crate::domain::example::NqExample;
    use crate::infra::checkpoint::load_trainer_state;
    use crate::infra::metrics::{CsvTracker, NoopTracker};
    use crate::infra::pretrained::fixtures::write_tiny_model_dir;
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;

    type TestBackend = Autodiff<NdArray>;

    fn examples(n: usize, offset: usize) -> Vec<NqExample> {
        (0..n)
            .map(|i| {
                let len = 6 + (i + offset) % 14;
                let ids = (0..len).map(|t| 4 + ((t + i) % 40) as u32).collect();
                NqExample::new(ids, (1 + i % 3) as i64, (2 + i % 3) as i64)
            })
            .collect()
    }

    fn test_config(root: &Path) -> RunConfig {
        let mut cfg = RunConfig::default();
        cfg.device = DeviceKind::Cpu;
        cfg.model = ModelOptions {
            model_dir: root.join("model"),
            block_size: 4,
            num_random_blocks: 1,
            gradient_checkpointing: false,
            ..ModelOptions::default()
        };
        cfg.training = TrainingOptions {
            output_dir: root.join("out"),
            final_model_dir: root.join("final-model"),
            interrupted_dir: root.join("interrupted"),
            train_batch_size: 2,
            eval_batch_size: 2,
            gradient_accumulation_steps: 2,
            learning_rate: 1e-3,
            num_epochs: 2,
            logging_steps: 1,
            save_steps: 2,
            pad_threshold: 32,
            ..TrainingOptions::default()
        };
        cfg
    }

    fn inputs(cfg: &RunConfig, tracker: Box<dyn ExperimentTracker>, stop: StopFlag) -> TrainingInputs {
        write_tiny_model_dir(&cfg.model.model_dir);
        let model_dir = PretrainedModelDir::new(&cfg.model.model_dir);
        let pretrained = model_dir.load_config().unwrap();
        let tokenizer = model_dir.load_tokenizer().unwrap();
        TrainingInputs {
            train_set: NqDataset::new(examples(6, 0)),
            valid_set: NqDataset::new(examples(3, 5)),
            model_config: pretrained.to_model_config(&cfg.model),
            model_dir,
            pretrained,
            tokenizer,
            pad_id: 0,
            tracker,
            stop,
            run_config: serde_json::to_string(cfg).unwrap(),
        }
    }

    #[test]
    fn test_full_run_writes_checkpoints_and_final_model() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        let tracker = CsvTracker::new(tmp.path().join("tracking"), "p", "r").unwrap();

        let outcome = train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(tracker), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        // 6 examples / batch 2 = 3 batches → 2 optimizer steps per epoch, 2 epochs
        let out = &cfg.training.output_dir;
        assert!(out.join("checkpoint-2").join("optimizer.mpk.gz").exists());
        let state = load_trainer_state(&out.join("checkpoint-2")).unwrap();
        assert_eq!(state.epochs_completed, 1);
        let state = load_trainer_state(&out.join("checkpoint-4")).unwrap();
        assert_eq!(state.global_step, 4);
        assert_eq!(state.epochs_completed, 2);
        assert_eq!(state.eval_history.len(), 2);
        assert!(state.best_eval_loss.is_some());

        let final_dir = &cfg.training.final_model_dir;
        assert!(final_dir.join("model.mpk.gz").exists());
        assert!(final_dir.join("config.json").exists());
        assert!(final_dir.join("tokenizer.json").exists());
        assert!(!cfg.training.interrupted_dir.exists());

        let eval_csv = std::fs::read_to_string(tmp.path().join("tracking/p/r/eval.csv")).unwrap();
        assert_eq!(eval_csv.lines().count(), 3);
        let train_csv = std::fs::read_to_string(tmp.path().join("tracking/p/r/train.csv")).unwrap();
        assert_eq!(train_csv.lines().count(), 5);
    }

    #[test]
    fn test_stop_flag_saves_interrupted_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        let stop = StopFlag::new();
        stop.request_stop();

        let outcome = train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(NoopTracker), stop),
            NdArrayDevice::Cpu,
        )
        .unwrap();

        assert_eq!(outcome, RunOutcome::Interrupted);
        let dir = &cfg.training.interrupted_dir;
        assert!(dir.join("model.mpk.gz").exists());
        assert_eq!(load_trainer_state(dir).unwrap().global_step, 0);
        assert!(!cfg.training.final_model_dir.exists());
    }

    struct FailingTracker;

    impl ExperimentTracker for FailingTracker {
        fn log_train(&mut self, _: &TrainLog) -> Result<()> {
            bail!("tracking backend unavailable")
        }
        fn log_eval(&mut self, _: &EvalLog) -> Result<()> { Ok(()) }
        fn finish(&mut self) -> Result<()> { Ok(()) }
    }

    #[test]
    fn test_error_mid_run_still_saves_interrupted_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());

        let err = train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(FailingTracker), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap_err();

        assert!(err.to_string().contains("tracking backend unavailable"));
        let dir = &cfg.training.interrupted_dir;
        assert_eq!(load_trainer_state(dir).unwrap().global_step, 1);
        assert!(!cfg.training.final_model_dir.exists());
    }

    #[test]
    fn test_resume_continues_from_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.training.num_epochs = 1;
        train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(NoopTracker), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap();

        cfg.training.num_epochs = 2;
        cfg.training.resume = ResumeFrom::Latest;
        let outcome = train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(NoopTracker), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        let state = load_trainer_state(&cfg.training.output_dir.join("checkpoint-4")).unwrap();
        assert_eq!(state.global_step, 4);
        assert_eq!(state.epochs_completed, 2);
        // first evaluation came from the run that wrote checkpoint-2
        assert_eq!(state.eval_history.len(), 2);
        assert_eq!(state.eval_history[0].step, 2);
    }

    struct PanickingTracker;

    impl ExperimentTracker for PanickingTracker {
        fn log_train(&mut self, _: &TrainLog) -> Result<()> {
            panic!("tracker exploded")
        }
        fn log_eval(&mut self, _: &EvalLog) -> Result<()> { Ok(()) }
        fn finish(&mut self) -> Result<()> { Ok(()) }
    }

    #[test]
    fn test_panic_mid_run_saves_interrupted_checkpoint_and_repanics() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = test_config(tmp.path());
        let inputs = inputs(&cfg, Box::new(PanickingTracker), StopFlag::new());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            train_on::<TestBackend>(&cfg, inputs, NdArrayDevice::Cpu)
        }));

        assert!(result.is_err());
        let dir = &cfg.training.interrupted_dir;
        assert!(dir.join("model.mpk.gz").exists());
        assert_eq!(load_trainer_state(dir).unwrap().global_step, 1);
        assert!(!cfg.training.final_model_dir.exists());
    }

    #[derive(Clone, Default)]
    struct RecordingTracker {
        train: Rc<RefCell<Vec<TrainLog>>>,
    }

    impl ExperimentTracker for RecordingTracker {
        fn log_train(&mut self, log: &TrainLog) -> Result<()> {
            self.train.borrow_mut().push(log.clone());
            Ok(())
        }
        fn log_eval(&mut self, _: &EvalLog) -> Result<()> { Ok(()) }
        fn finish(&mut self) -> Result<()> { Ok(()) }
    }

    #[test]
    fn test_resume_mid_epoch_skips_seen_batches() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        // 6 examples, batch 2, no accumulation → 3 steps in the one epoch
        cfg.training.num_epochs = 1;
        cfg.training.gradient_accumulation_steps = 1;
        cfg.training.save_steps = 1;
        train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(NoopTracker), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap();

        let first_out = cfg.training.output_dir.clone();
        cfg.training.resume = ResumeFrom::Checkpoint(first_out.join("checkpoint-1"));
        cfg.training.output_dir = tmp.path().join("resumed");
        cfg.training.final_model_dir = tmp.path().join("resumed-final");
        let tracker = RecordingTracker::default();
        let outcome = train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(tracker.clone()), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        // only the two batches after the first are trained again
        let logs = tracker.train.borrow();
        let steps: Vec<usize> = logs.iter().map(|l| l.step).collect();
        assert_eq!(steps, vec![2, 3]);
        assert!((logs[0].learning_rate - 1e-3 * 2.0 / 3.0).abs() < 1e-12);
        assert!((logs[1].learning_rate - 1e-3 / 3.0).abs() < 1e-12);

        let resumed = &cfg.training.output_dir;
        assert!(!resumed.join("checkpoint-1").exists());
        let state = load_trainer_state(&resumed.join("checkpoint-3")).unwrap();
        assert_eq!(state.global_step, 3);
        assert_eq!(state.epochs_completed, 1);
    }

    #[test]
    fn test_pad_threshold_beyond_position_table_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.training.pad_threshold = 100;

        let err = train_on::<TestBackend>(
            &cfg,
            inputs(&cfg, Box::new(NoopTracker), StopFlag::new()),
            NdArrayDevice::Cpu,
        )
        .unwrap_err();

        assert!(err.to_string().contains("pad threshold 100"));
        assert!(!cfg.training.output_dir.exists());
    }

    #[test]
    fn test_run_with_out_of_range_spans_trains_and_evaluates() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = test_config(tmp.path());
        cfg.training.num_epochs = 1;
        cfg.training.gradient_accumulation_steps = 1;
        let mut inputs = inputs(&cfg, Box::new(NoopTracker), StopFlag::new());
        inputs.train_set = NqDataset::new(vec![
            NqExample::new(vec![5; 8], -100, -100),
            NqExample::new(vec![6; 10], 2, 30),
            NqExample::new(vec![7; 12], 4, 3),
            NqExample::new(vec![8; 9], 1, 2),
        ]);
        // no end target inside its example
        inputs.valid_set = NqDataset::new(vec![
            NqExample::new(vec![9; 7], 1, 50),
            NqExample::new(vec![9; 11], 3, 11),
        ]);

        let outcome = train_on::<TestBackend>(&cfg, inputs, NdArrayDevice::Cpu).unwrap();
        assert_eq!(outcome, RunOutcome::Completed);

        let state = load_trainer_state(&cfg.training.output_dir.join("checkpoint-2")).unwrap();
        let eval = &state.eval_history[0];
        assert!(eval.loss.is_finite());
        assert_eq!(eval.samples, 2);
        assert_eq!(eval.end_acc, 0.0);
    }

    #[test]
    fn test_steps_per_epoch_rounds_up_twice() {
        // 10 examples → 3 batches of 4 → 2 steps with accumulation 2
        assert_eq!(steps_per_epoch(10, 4, 2), 2);
        assert_eq!(steps_per_epoch(16, 4, 4), 1);
        assert_eq!(steps_per_epoch(0, 4, 4), 0);
    }

    #[test]
    fn test_resume_latest_without_checkpoints_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mut opts = test_config(tmp.path()).training;
        opts.resume = ResumeFrom::Latest;
        assert!(resolve_resume(&opts).is_err());
    }
}
