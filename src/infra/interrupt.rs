// ============================================================
// Layer 6 — Interrupt Flag
// ============================================================
// Ctrl-C / SIGTERM handling for the training run.
//
// The handler only raises a flag. The training loop checks it
// between mini-batches and hands control back to the session,
// which saves the interrupted checkpoint before returning.
// A second Ctrl-C while saving terminates immediately.

use anyhow::{Context, Result};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared stop request, raised by the signal handler.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Install the process-wide Ctrl-C handler. Can only be called once.
pub fn install_interrupt_handler() -> Result<StopFlag> {
    let flag = StopFlag::new();
    let handler_flag = flag.clone();

    ctrlc::set_handler(move || {
        if handler_flag.is_raised() {
            eprintln!("\nSecond interrupt received, exiting without saving.");
            std::process::exit(130);
        }
        eprintln!("\nInterrupt received! Saving checkpoint before exit...");
        handler_flag.request_stop();
    })
    .context("Cannot install Ctrl-C handler")?;

    Ok(flag)
}
