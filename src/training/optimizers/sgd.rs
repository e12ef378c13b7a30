//! SGD optimizer implementation with momentum
//!
//! This module provides the Stochastic Gradient Descent optimizer with
//! optional momentum and weight decay support.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use serde::{Deserialize, Serialize};

use super::{Optimizer, OptimizerFactory};
use crate::error::{Error, Result};

/// SGD hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    /// Learning rate
    pub learning_rate: f64,
    /// Momentum coefficient, 0 disables momentum
    #[serde(default)]
    pub momentum: f64,
    /// L2 weight decay coefficient
    #[serde(default)]
    pub weight_decay: f64,
}

impl Sgd {
    /// Plain SGD
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            weight_decay: 0.0,
        }
    }

    /// Set the momentum coefficient
    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }

    /// Set the weight decay coefficient
    pub fn with_weight_decay(mut self, weight_decay: f64) -> Self {
        self.weight_decay = weight_decay;
        self
    }
}

impl OptimizerFactory for Sgd {
    fn bind(&self, vars: Vec<Var>) -> Result<Box<dyn Optimizer>> {
        Ok(Box::new(SGDOptimizer::new(
            vars,
            self.learning_rate,
            self.momentum,
            self.weight_decay,
        )?))
    }
}

/// SGD optimizer with momentum
pub struct SGDOptimizer {
    /// Parameters being optimized
    vars: Vec<Var>,

    /// Learning rate
    learning_rate: f64,

    /// Momentum coefficient
    momentum: f64,

    /// Weight decay coefficient
    weight_decay: f64,

    /// Current step count
    step_count: usize,

    /// Momentum buffers, one slot per variable
    momentum_buffers: Vec<Option<Tensor>>,
}

impl SGDOptimizer {
    /// Create a new SGD optimizer
    pub fn new(vars: Vec<Var>, learning_rate: f64, momentum: f64, weight_decay: f64) -> Result<Self> {
        if learning_rate < 0.0 {
            return Err(Error::config(format!(
                "learning rate must be non-negative, got {learning_rate}"
            )));
        }
        if !(0.0..1.0).contains(&momentum) {
            return Err(Error::config(format!("momentum must be in [0, 1), got {momentum}")));
        }

        let momentum_buffers = vec![None; vars.len()];
        Ok(Self {
            vars,
            learning_rate,
            momentum,
            weight_decay,
            step_count: 0,
            momentum_buffers,
        })
    }

    /// Apply SGD update to one parameter
    fn update_parameter(&mut self, index: usize, grad: &Tensor) -> Result<()> {
        let var = &self.vars[index];

        let effective_grad = if self.weight_decay > 0.0 {
            grad.add(&var.as_tensor().affine(self.weight_decay, 0.0)?)?
        } else {
            grad.clone()
        };

        let update = if self.momentum > 0.0 {
            // v_t = μ * v_{t-1} + g_t
            let velocity = match self.momentum_buffers[index].take() {
                Some(previous) => previous.affine(self.momentum, 0.0)?.add(&effective_grad)?,
                None => effective_grad,
            };
            self.momentum_buffers[index] = Some(velocity.clone());
            velocity
        } else {
            effective_grad
        };

        // θ_t = θ_{t-1} - α * update
        let updated = var.as_tensor().sub(&update.affine(self.learning_rate, 0.0)?)?;
        var.set(&updated)?;
        Ok(())
    }
}

impl Optimizer for SGDOptimizer {
    fn name(&self) -> &str {
        if self.momentum > 0.0 {
            "sgd_momentum"
        } else {
            "sgd"
        }
    }

    fn step(&mut self, gradients: &GradStore) -> Result<()> {
        self.step_count += 1;

        for index in 0..self.vars.len() {
            let grad = match gradients.get(self.vars[index].as_tensor()) {
                Some(grad) => grad.clone(),
                None => continue,
            };
            self.update_parameter(index, &grad)?;
        }
        Ok(())
    }

    fn zero_grad(&mut self) -> Result<()> {
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.learning_rate = lr;
    }

    fn parameter_count(&self) -> usize {
        self.vars.len()
    }

    fn step_count(&self) -> usize {
        self.step_count
    }
}
