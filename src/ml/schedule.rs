//! Linear learning-rate decay.
//!
//! The rate starts at `initial_lr` and falls linearly to zero over
//! `total_steps` optimizer steps. There is no warmup phase.

/// Learning-rate schedule driven by the optimizer step counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearSchedule {
    initial_lr:  f64,
    total_steps: usize,
}

impl LinearSchedule {
    pub fn new(initial_lr: f64, total_steps: usize) -> Self {
        Self { initial_lr, total_steps }
    }

    /// Rate for the optimizer step taken after `completed_steps` steps.
    pub fn lr_at(&self, completed_steps: usize) -> f64 {
        if self.total_steps == 0 {
            return self.initial_lr;
        }
        let remaining = self.total_steps.saturating_sub(completed_steps) as f64;
        self.initial_lr * remaining / self.total_steps as f64
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }
}
