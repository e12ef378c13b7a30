//! Callback reporting loop progress through `tracing`

use tracing::{debug, info};

use super::{Callback, EpochEnd, EpochStart, IterationEnd, RunEnd};
use crate::error::Result;

/// Logs epoch summaries and, optionally, every n-th batch loss
#[derive(Debug, Default)]
pub struct LoggingCallback {
    log_every: Option<usize>,
    loss_sum: f64,
    batches: usize,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log the loss of every `n`-th batch
    pub fn every(mut self, n: usize) -> Self {
        self.log_every = (n > 0).then_some(n);
        self
    }
}

impl Callback for LoggingCallback {
    fn start_epoch(&mut self, event: &EpochStart<'_>) -> Result<()> {
        self.loss_sum = 0.0;
        self.batches = 0;
        debug!(
            phase = event.name,
            epoch = event.trainer.epoch(),
            "Starting epoch"
        );
        Ok(())
    }

    fn end_iteration(&mut self, event: &IterationEnd<'_>) -> Result<()> {
        self.loss_sum += event.loss;
        self.batches += 1;

        if let Some(n) = self.log_every {
            if self.batches % n == 0 {
                info!(
                    phase = event.name,
                    step = event.step,
                    loss = event.loss,
                    "Batch {}",
                    self.batches
                );
            }
        }
        Ok(())
    }

    fn end_epoch(&mut self, event: &EpochEnd<'_>) -> Result<()> {
        let mean = if self.batches > 0 {
            self.loss_sum / self.batches as f64
        } else {
            0.0
        };
        info!(
            "{} epoch {}: mean loss {:.6} over {}/{} batches",
            event.name, event.epoch, mean, self.batches, event.iter_per_epoch
        );
        Ok(())
    }

    fn end_all(&mut self, event: &RunEnd<'_>) -> Result<()> {
        info!(
            "Training finished after {} epochs ({} steps)",
            event.trainer.epoch(),
            event.trainer.step()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
