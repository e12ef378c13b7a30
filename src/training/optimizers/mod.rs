//! Optimizers and learning rate schedulers
//!
//! An [`OptimizerFactory`] is the user-facing description of an optimizer; the
//! trainer binds it to the variables of the model(s) it owns and keeps the
//! resulting [`Optimizer`]. Schedulers follow the same pattern with a
//! [`SchedulerFactory`] bound to an optimizer.

pub mod adamw;
pub mod schedulers;
pub mod sgd;

pub use adamw::{AdamW, AdamWOptimizer};
pub use schedulers::{
    ConstantScheduler, CosineScheduler, ExponentialScheduler, LinearScheduler, Scheduler,
    SchedulerConfig, SchedulerFactory, SchedulerFactoryGroup, SchedulerGroup, StepScheduler,
};
pub use sgd::{SGDOptimizer, Sgd};

use candle_core::backprop::GradStore;
use candle_core::Var;
use serde::{Deserialize, Serialize};

use super::group::Group;
use crate::error::Result;

/// Trait for optimizers bound to a set of variables
pub trait Optimizer {
    /// Optimizer name
    fn name(&self) -> &str;

    /// Clear accumulated gradient state.
    ///
    /// Candle materializes gradients in a fresh `GradStore` on every backward
    /// pass, so most optimizers have nothing to clear.
    fn zero_grad(&mut self) -> Result<()> {
        Ok(())
    }

    /// Apply one update from `gradients`
    fn step(&mut self, gradients: &GradStore) -> Result<()>;

    /// Get current learning rate
    fn learning_rate(&self) -> f64;

    /// Set learning rate
    fn set_learning_rate(&mut self, lr: f64);

    /// Number of variables being optimized
    fn parameter_count(&self) -> usize;

    /// Number of updates applied so far
    fn step_count(&self) -> usize;
}

/// Describes an optimizer before it is bound to parameters
pub trait OptimizerFactory {
    /// Create an optimizer over `vars`
    fn bind(&self, vars: Vec<Var>) -> Result<Box<dyn Optimizer>>;
}

/// Optimizers owned by a trainer
pub type OptimizerGroup = Group<Box<dyn Optimizer>>;

/// Optimizer factories handed to a trainer builder
pub type OptimizerFactoryGroup = Group<Box<dyn OptimizerFactory>>;

impl Group<Box<dyn Optimizer>> {
    /// Zero gradients of every optimizer
    pub fn zero_grad(&mut self) -> Result<()> {
        for optimizer in self.values_mut() {
            optimizer.zero_grad()?;
        }
        Ok(())
    }

    /// Apply one step of every optimizer
    pub fn step(&mut self, gradients: &GradStore) -> Result<()> {
        for optimizer in self.values_mut() {
            optimizer.step(gradients)?;
        }
        Ok(())
    }

    /// Learning rate of every optimizer, keyed like the group
    pub fn learning_rates(&self) -> Group<f64> {
        match self {
            Group::Single(optimizer) => Group::Single(optimizer.learning_rate()),
            Group::Keyed(map) => Group::Keyed(
                map.iter()
                    .map(|(key, optimizer)| (key.clone(), optimizer.learning_rate()))
                    .collect(),
            ),
        }
    }
}

/// Serializable optimizer description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OptimizerConfig {
    /// Stochastic gradient descent
    Sgd(Sgd),
    /// AdamW with decoupled weight decay
    AdamW(AdamW),
}

impl OptimizerFactory for OptimizerConfig {
    fn bind(&self, vars: Vec<Var>) -> Result<Box<dyn Optimizer>> {
        match self {
            Self::Sgd(sgd) => sgd.bind(vars),
            Self::AdamW(adamw) => adamw.bind(vars),
        }
    }
}
