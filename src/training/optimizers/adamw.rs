//! AdamW optimizer implementation
//!
//! Wraps `candle_nn::AdamW`, which implements decoupled weight decay.

use candle_core::backprop::GradStore;
use candle_core::Var;
use candle_nn::{Optimizer as _, ParamsAdamW};
use serde::{Deserialize, Serialize};

use super::{Optimizer, OptimizerFactory};
use crate::error::Result;

/// AdamW hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamW {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1 (first moment decay)
    pub beta1: f64,
    /// Beta2 (second moment decay)
    pub beta2: f64,
    /// Epsilon for numerical stability
    pub eps: f64,
    /// Decoupled weight decay
    pub weight_decay: f64,
}

impl Default for AdamW {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
    }
}

impl AdamW {
    /// Default hyperparameters with the given learning rate
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            ..Self::default()
        }
    }

    fn params(&self) -> ParamsAdamW {
        ParamsAdamW {
            lr: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
            weight_decay: self.weight_decay,
        }
    }
}

impl OptimizerFactory for AdamW {
    fn bind(&self, vars: Vec<Var>) -> Result<Box<dyn Optimizer>> {
        let parameter_count = vars.len();
        let inner = candle_nn::AdamW::new(vars, self.params())?;
        Ok(Box::new(AdamWOptimizer {
            inner,
            parameter_count,
            step_count: 0,
        }))
    }
}

/// AdamW optimizer bound to a set of variables
pub struct AdamWOptimizer {
    inner: candle_nn::AdamW,
    parameter_count: usize,
    step_count: usize,
}

impl Optimizer for AdamWOptimizer {
    fn name(&self) -> &str {
        "adamw"
    }

    fn step(&mut self, gradients: &GradStore) -> Result<()> {
        self.inner.step(gradients)?;
        self.step_count += 1;
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.inner.learning_rate()
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.inner.set_learning_rate(lr);
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn step_count(&self) -> usize {
        self.step_count
    }
}
