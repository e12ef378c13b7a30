//! Per-epoch metric history
//!
//! [`MetricHistory`] averages the loss (and optionally classification
//! accuracy) over every epoch of every phase. Read results through a
//! [`HistoryHandle`], which stays valid after the callback has been moved into
//! a trainer.

use std::collections::BTreeMap;
use std::sync::Arc;

use candle_core::Device;
use parking_lot::Mutex;
use serde::Serialize;

use super::{Callback, EpochEnd, EpochStart, IterationEnd};
use crate::error::Result;
use crate::training::loss::correct_predictions;

/// Recorded metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Mean loss over the batches of an epoch
    Loss,
    /// Fraction of samples whose argmax matches the integer target
    Accuracy,
}

type Series = BTreeMap<(String, Metric), Vec<f64>>;

#[derive(Debug, Default)]
struct EpochTally {
    loss_sum: f64,
    batches: usize,
    correct: usize,
    samples: usize,
}

/// Callback recording one value per metric per epoch, keyed by phase name
#[derive(Debug, Default)]
pub struct MetricHistory {
    series: Arc<Mutex<Series>>,
    track_accuracy: bool,
    tally: EpochTally,
}

impl MetricHistory {
    /// Record the loss only
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record accuracy, reading the target from the second tensor of
    /// each batch
    pub fn with_accuracy(mut self) -> Self {
        self.track_accuracy = true;
        self
    }

    /// Shared read access to the recorded series
    pub fn handle(&self) -> HistoryHandle {
        HistoryHandle {
            series: Arc::clone(&self.series),
        }
    }
}

impl Callback for MetricHistory {
    fn start_epoch(&mut self, _event: &EpochStart<'_>) -> Result<()> {
        self.tally = EpochTally::default();
        Ok(())
    }

    fn end_iteration(&mut self, event: &IterationEnd<'_>) -> Result<()> {
        self.tally.loss_sum += event.loss;
        self.tally.batches += 1;

        if self.track_accuracy {
            if let Some(target) = event.data.get(1) {
                let target = target.to_device(&Device::Cpu)?;
                self.tally.correct += correct_predictions(event.output, &target)?;
                self.tally.samples += event.output.dim(0)?;
            }
        }
        Ok(())
    }

    fn end_epoch(&mut self, event: &EpochEnd<'_>) -> Result<()> {
        let tally = std::mem::take(&mut self.tally);
        let mut series = self.series.lock();

        if tally.batches > 0 {
            series
                .entry((event.name.to_string(), Metric::Loss))
                .or_default()
                .push(tally.loss_sum / tally.batches as f64);
        }
        if tally.samples > 0 {
            series
                .entry((event.name.to_string(), Metric::Accuracy))
                .or_default()
                .push(tally.correct as f64 / tally.samples as f64);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "metric_history"
    }
}

/// Cloneable reader over a [`MetricHistory`]
#[derive(Debug, Clone)]
pub struct HistoryHandle {
    series: Arc<Mutex<Series>>,
}

impl HistoryHandle {
    /// Values of `metric` for `phase`, one per epoch
    pub fn series(&self, phase: &str, metric: Metric) -> Vec<f64> {
        self.series
            .lock()
            .get(&(phase.to_string(), metric))
            .cloned()
            .unwrap_or_default()
    }

    pub fn loss(&self, phase: &str) -> Vec<f64> {
        self.series(phase, Metric::Loss)
    }

    pub fn accuracy(&self, phase: &str) -> Vec<f64> {
        self.series(phase, Metric::Accuracy)
    }

    /// Most recent value of `metric` for `phase`
    pub fn last(&self, phase: &str, metric: Metric) -> Option<f64> {
        self.series
            .lock()
            .get(&(phase.to_string(), metric))
            .and_then(|values| values.last().copied())
    }

    /// Phase names with at least one recorded value
    pub fn phases(&self) -> Vec<String> {
        let mut phases: Vec<String> = self
            .series
            .lock()
            .keys()
            .map(|(phase, _)| phase.clone())
            .collect();
        phases.dedup();
        phases
    }
}
