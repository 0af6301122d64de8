// ============================================================
// Layer 6 — Experiment Tracking
// ============================================================
// Records training and evaluation metrics to CSV files, one
// directory per run:
//
//   <root>/<project>/<run_name>/
//     train.csv     step,epoch,loss,learning_rate
//     eval.csv      step,epoch,loss,start_acc,end_acc,samples
//     summary.json  last train + eval rows, written by finish()
//
// Files are appended to, so a resumed run continues the same
// curves. When tracking is disabled the NoopTracker is used.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::metrics::{EvalLog, TrainLog};
use crate::domain::traits::ExperimentTracker;

const TRAIN_HEADER: &str = "step,epoch,loss,learning_rate";
const EVAL_HEADER: &str = "step,epoch,loss,start_acc,end_acc,samples";

#[derive(Serialize)]
struct Summary<'a> {
    project:    &'a str,
    run_name:   &'a str,
    last_train: Option<&'a TrainLog>,
    last_eval:  Option<&'a EvalLog>,
}

pub struct CsvTracker {
    project:    String,
    run_name:   String,
    run_dir:    PathBuf,
    last_train: Option<TrainLog>,
    last_eval:  Option<EvalLog>,
}

impl CsvTracker {
    pub fn new(root: impl Into<PathBuf>, project: &str, run_name: &str) -> Result<Self> {
        let run_dir = root.into().join(project).join(run_name);
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("Cannot create tracking dir '{}'", run_dir.display()))?;

        write_header_if_new(&run_dir.join("train.csv"), TRAIN_HEADER)?;
        write_header_if_new(&run_dir.join("eval.csv"), EVAL_HEADER)?;

        tracing::info!("Tracking run '{}' of project '{}' in '{}'", run_name, project, run_dir.display());
        Ok(Self {
            project:    project.to_string(),
            run_name:   run_name.to_string(),
            run_dir,
            last_train: None,
            last_eval:  None,
        })
    }

    fn append(&self, file: &str, row: String) -> Result<()> {
        let path = self.run_dir.join(file);
        let mut f = OpenOptions::new()
            .append(true)
            .open(&path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;
        writeln!(f, "{row}")?;
        Ok(())
    }
}

fn write_header_if_new(path: &Path, header: &str) -> Result<()> {
    if !path.exists() {
        let mut f = fs::File::create(path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        writeln!(f, "{header}")?;
    }
    Ok(())
}

impl ExperimentTracker for CsvTracker {
    fn log_train(&mut self, m: &TrainLog) -> Result<()> {
        self.append(
            "train.csv",
            format!("{},{:.4},{:.6},{:.6e}", m.step, m.epoch, m.loss, m.learning_rate),
        )?;
        self.last_train = Some(m.clone());
        Ok(())
    }

    fn log_eval(&mut self, m: &EvalLog) -> Result<()> {
        self.append(
            "eval.csv",
            format!(
                "{},{:.4},{:.6},{:.6},{:.6},{}",
                m.step, m.epoch, m.loss, m.start_acc, m.end_acc, m.samples
            ),
        )?;
        self.last_eval = Some(m.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let summary = Summary {
            project:    &self.project,
            run_name:   &self.run_name,
            last_train: self.last_train.as_ref(),
            last_eval:  self.last_eval.as_ref(),
        };
        let path = self.run_dir.join("summary.json");
        fs::write(&path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::info!("Tracking run '{}' finished", self.run_name);
        Ok(())
    }
}

/// Tracker used when tracking is disabled.
pub struct NoopTracker;

impl ExperimentTracker for NoopTracker {
    fn log_train(&mut self, _: &TrainLog) -> Result<()> { Ok(()) }

    fn log_eval(&mut self, _: &EvalLog) -> Result<()> { Ok(()) }

    fn finish(&mut self) -> Result<()> { Ok(()) }
}
