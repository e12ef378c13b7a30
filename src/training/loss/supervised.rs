//! Standard supervised losses over `candle_nn::loss`

use candle_core::{Tensor, D};
use candle_nn as nn;

use super::LossFn;
use crate::error::{Error, Result};

/// Mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl LossFn for MseLoss {
    fn compute(&self, output: &Tensor, target: &Tensor) -> Result<Tensor> {
        Ok(nn::loss::mse(output, target)?)
    }

    fn name(&self) -> &str {
        "mse"
    }
}

/// Cross entropy over logits with integer class targets
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropyLoss {
    label_smoothing: f64,
}

impl CrossEntropyLoss {
    /// Plain cross entropy
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross entropy with label smoothing in `[0, 1)`
    pub fn with_label_smoothing(label_smoothing: f64) -> Result<Self> {
        if !(0.0..1.0).contains(&label_smoothing) {
            return Err(Error::config(format!(
                "label smoothing must be in [0, 1), got {label_smoothing}"
            )));
        }
        Ok(Self { label_smoothing })
    }

    fn smoothed(&self, logits: &Tensor, target: &Tensor) -> Result<Tensor> {
        let log_probs = nn::ops::log_softmax(logits, D::Minus1)?;
        let nll = nn::loss::nll(&log_probs, target)?;
        // Uniform component: mean over classes of -log p, averaged over the batch
        let uniform = log_probs.mean(D::Minus1)?.mean_all()?.neg()?;
        let loss = ((nll * (1.0 - self.label_smoothing))? + (uniform * self.label_smoothing)?)?;
        Ok(loss)
    }
}

impl LossFn for CrossEntropyLoss {
    fn compute(&self, output: &Tensor, target: &Tensor) -> Result<Tensor> {
        if self.label_smoothing > 0.0 {
            self.smoothed(output, target)
        } else {
            Ok(nn::loss::cross_entropy(output, target)?)
        }
    }

    fn name(&self) -> &str {
        "cross_entropy"
    }
}
