// ============================================================
// Layer 3 — Metric Records
// ============================================================
// Values the training loop reports to an ExperimentTracker.

use serde::{Deserialize, Serialize};

/// One logging-interval summary of the training phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainLog {
    /// Optimizer step the summary was taken at
    pub step: usize,

    /// Fractional epoch, e.g. 1.25 = a quarter into the second epoch
    pub epoch: f64,

    /// Mean loss over the optimizer steps since the previous log
    pub loss: f64,

    /// Learning rate used for the most recent optimizer step
    pub learning_rate: f64,
}

/// Result of one pass over the validation set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalLog {
    pub step: usize,
    pub epoch: f64,

    /// Mean of start/end cross entropy over validation batches
    pub loss: f64,

    /// Fraction of examples whose start position was predicted exactly
    pub start_acc: f64,

    /// Fraction of examples whose end position was predicted exactly
    pub end_acc: f64,

    pub samples: usize,
}

impl EvalLog {
    /// Returns true if this evaluation improved over the previous best loss
    pub fn is_improvement(&self, best_loss: f64) -> bool {
        self.loss < best_loss
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EvalLog { step: 10, epoch: 1.0, loss: 2.3, start_acc: 0.2, end_acc: 0.2, samples: 8 };
        assert!(m.is_improvement(3.0));
        assert!(!m.is_improvement(2.0));
    }
}
