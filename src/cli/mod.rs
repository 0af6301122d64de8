// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`   — fine-tunes the model on Natural Questions
//   2. `inspect` — decodes a few examples for a quick check
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, InspectArgs, TrainArgs};

use crate::application::config::RunConfig;
use crate::ml::trainer::RunOutcome;

#[derive(Parser, Debug)]
#[command(
    name = "nq-finetune",
    version,
    about = "Fine-tune a BigBird span-prediction model on Natural Questions."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Inspect(args) => run_inspect(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config: RunConfig = args.into();
    let t = &config.training;
    println!(
        "Batch size: {} x {} accumulation = {} examples per step",
        t.train_batch_size,
        t.gradient_accumulation_steps,
        t.effective_batch_size()
    );

    let use_case = TrainUseCase::new(config);
    match use_case.execute()? {
        RunOutcome::Completed => println!(
            "Training complete. Model saved to '{}'.",
            use_case.config().training.final_model_dir.display()
        ),
        RunOutcome::Interrupted => println!(
            "Training interrupted. Checkpoint saved to '{}'.",
            use_case.config().training.interrupted_dir.display()
        ),
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<()> {
    use crate::application::inspect_use_case::InspectUseCase;

    let report = InspectUseCase::new(
        &args.train_file,
        &args.model_dir,
        args.count,
        args.pad_threshold,
    )
    .execute()?;

    println!("{} answerable examples in '{}'", report.answerable, args.train_file.display());
    for ex in &report.examples {
        println!("\n#{} ({} tokens, span {}..={})", ex.index, ex.length, ex.start_token, ex.end_token);
        println!("  Question: {}", ex.question);
        println!("  Answer:   {}", ex.answer);
    }
    println!("\nCollated width of these {} examples: {}", report.examples.len(), report.batch_width);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_train_defaults_map_to_run_config() {
        let cli = Cli::try_parse_from(["nq-finetune", "train", "--tracking", "false"]).unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: RunConfig = args.into();

        assert_eq!(cfg.training.effective_batch_size(), 16);
        assert_eq!(cfg.training.learning_rate, 7e-5);
        assert_eq!(cfg.training.save_steps, 300);
        assert!(cfg.training.group_by_length);
        assert!(cfg.model.gradient_checkpointing);
        assert!(!cfg.tracking.enabled);
        assert_eq!(cfg.training.resume, crate::application::config::ResumeFrom::Scratch);
    }

    #[test]
    fn test_resume_and_device_flags() {
        let cli = Cli::try_parse_from([
            "nq-finetune", "train",
            "--resume-from-checkpoint", "out/checkpoint-600",
            "--device", "cpu",
            "--attention-type", "original_full",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else { panic!("expected train") };
        let cfg: RunConfig = args.into();

        assert_eq!(
            cfg.training.resume,
            crate::application::config::ResumeFrom::Checkpoint(PathBuf::from("out/checkpoint-600"))
        );
        assert_eq!(cfg.device, crate::application::config::DeviceKind::Cpu);
        assert_eq!(cfg.model.attention_type, crate::ml::attention::AttentionType::OriginalFull);
    }

    #[test]
    fn test_resume_flags_conflict() {
        let parsed = Cli::try_parse_from([
            "nq-finetune", "train", "--resume-latest", "--resume-from-checkpoint", "x",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_inspect_parses_count() {
        let cli = Cli::try_parse_from(["nq-finetune", "inspect", "--count", "3"]).unwrap();
        let Commands::Inspect(args) = cli.command else { panic!("expected inspect") };
        assert_eq!(args.count, 3);
    }
}
