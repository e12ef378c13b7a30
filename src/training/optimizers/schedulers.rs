//! Learning rate schedulers for training optimization
//!
//! This module provides constant, linear, cosine, exponential and step-based
//! schedules with optional linear warmup. The trainer steps a scheduler once
//! per training epoch and pushes the new rate into the paired optimizer, so
//! "steps" below are scheduler steps, not batches.

use serde::{Deserialize, Serialize};

use super::Optimizer;
use crate::error::{Error, Result};
use crate::training::group::Group;

/// Trait for learning rate schedulers
pub trait Scheduler {
    /// Scheduler name
    fn name(&self) -> &str;

    /// Advance one step and return the new learning rate
    fn step(&mut self) -> f64;

    /// Get current learning rate
    fn get_lr(&self) -> f64;

    /// Check if scheduler is done (for finite schedules)
    fn is_done(&self) -> bool {
        false
    }

    /// Reset scheduler to initial state
    fn reset(&mut self);
}

/// Describes a schedule before it is bound to an optimizer
pub trait SchedulerFactory {
    /// Create a scheduler starting from `optimizer`'s learning rate
    fn bind(&self, optimizer: &dyn Optimizer) -> Result<Box<dyn Scheduler>>;
}

/// Schedulers owned by a trainer
pub type SchedulerGroup = Group<Box<dyn Scheduler>>;

/// Scheduler factories handed to a trainer builder
pub type SchedulerFactoryGroup = Group<Box<dyn SchedulerFactory>>;

/// Linear warmup: reaches `base_lr` on the last warmup step
fn warmup_lr(base_lr: f64, step: usize, warmup_steps: usize) -> Option<f64> {
    (step < warmup_steps).then(|| base_lr * (step + 1) as f64 / warmup_steps as f64)
}

fn decay_progress(step: usize, warmup_steps: usize, total_steps: usize) -> f64 {
    let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
    ((step - warmup_steps) as f64 / decay_steps as f64).min(1.0)
}

/// Constant learning rate
pub struct ConstantScheduler {
    lr: f64,
}

impl ConstantScheduler {
    /// Create a new constant scheduler
    pub fn new(lr: f64) -> Self {
        Self { lr }
    }
}

impl Scheduler for ConstantScheduler {
    fn name(&self) -> &str {
        "constant"
    }

    fn step(&mut self) -> f64 {
        self.lr
    }

    fn get_lr(&self) -> f64 {
        self.lr
    }

    fn reset(&mut self) {}
}

/// Linear learning rate scheduler
pub struct LinearScheduler {
    /// Base learning rate
    base_lr: f64,

    /// Minimum learning rate
    min_lr: f64,

    /// Total scheduler steps
    total_steps: usize,

    /// Warmup steps
    warmup_steps: usize,

    /// Current step
    current_step: usize,

    /// Current learning rate
    current_lr: f64,
}

impl LinearScheduler {
    /// Create a new linear scheduler
    pub fn new(base_lr: f64, min_lr: f64, total_steps: usize, warmup_steps: usize) -> Self {
        let mut scheduler = Self {
            base_lr,
            min_lr,
            total_steps,
            warmup_steps,
            current_step: 0,
            current_lr: base_lr,
        };
        scheduler.current_lr = scheduler.calculate_lr();
        scheduler
    }

    fn calculate_lr(&self) -> f64 {
        warmup_lr(self.base_lr, self.current_step, self.warmup_steps).unwrap_or_else(|| {
            let progress = decay_progress(self.current_step, self.warmup_steps, self.total_steps);
            self.min_lr + (self.base_lr - self.min_lr) * (1.0 - progress)
        })
    }
}

impl Scheduler for LinearScheduler {
    fn name(&self) -> &str {
        "linear"
    }

    fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.current_lr = self.calculate_lr();
        self.current_lr
    }

    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn is_done(&self) -> bool {
        self.current_step >= self.total_steps
    }

    fn reset(&mut self) {
        self.current_step = 0;
        self.current_lr = self.calculate_lr();
    }
}

/// Cosine annealing learning rate scheduler
pub struct CosineScheduler {
    /// Base learning rate
    base_lr: f64,

    /// Minimum learning rate
    min_lr: f64,

    /// Total scheduler steps
    total_steps: usize,

    /// Warmup steps
    warmup_steps: usize,

    /// Current step
    current_step: usize,

    /// Current learning rate
    current_lr: f64,
}

impl CosineScheduler {
    /// Create a new cosine scheduler
    pub fn new(base_lr: f64, min_lr: f64, total_steps: usize, warmup_steps: usize) -> Self {
        let mut scheduler = Self {
            base_lr,
            min_lr,
            total_steps,
            warmup_steps,
            current_step: 0,
            current_lr: base_lr,
        };
        scheduler.current_lr = scheduler.calculate_lr();
        scheduler
    }

    fn calculate_lr(&self) -> f64 {
        warmup_lr(self.base_lr, self.current_step, self.warmup_steps).unwrap_or_else(|| {
            let progress = decay_progress(self.current_step, self.warmup_steps, self.total_steps);
            let cosine_factor = 0.5 * (1.0 + (std::f64::consts::PI * progress).cos());
            self.min_lr + (self.base_lr - self.min_lr) * cosine_factor
        })
    }
}

impl Scheduler for CosineScheduler {
    fn name(&self) -> &str {
        "cosine"
    }

    fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.current_lr = self.calculate_lr();
        self.current_lr
    }

    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn is_done(&self) -> bool {
        self.current_step >= self.total_steps
    }

    fn reset(&mut self) {
        self.current_step = 0;
        self.current_lr = self.calculate_lr();
    }
}

/// Exponential learning rate scheduler
pub struct ExponentialScheduler {
    base_lr: f64,
    gamma: f64,
    warmup_steps: usize,
    current_step: usize,
    current_lr: f64,
}

impl ExponentialScheduler {
    /// Create a new exponential scheduler
    pub fn new(base_lr: f64, gamma: f64, warmup_steps: usize) -> Self {
        let mut scheduler = Self {
            base_lr,
            gamma,
            warmup_steps,
            current_step: 0,
            current_lr: base_lr,
        };
        scheduler.current_lr = scheduler.calculate_lr();
        scheduler
    }

    fn calculate_lr(&self) -> f64 {
        warmup_lr(self.base_lr, self.current_step, self.warmup_steps).unwrap_or_else(|| {
            let decay_steps = self.current_step - self.warmup_steps;
            self.base_lr * self.gamma.powi(decay_steps as i32)
        })
    }
}

impl Scheduler for ExponentialScheduler {
    fn name(&self) -> &str {
        "exponential"
    }

    fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.current_lr = self.calculate_lr();
        self.current_lr
    }

    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn reset(&mut self) {
        self.current_step = 0;
        self.current_lr = self.calculate_lr();
    }
}

/// Step learning rate scheduler
pub struct StepScheduler {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    warmup_steps: usize,
    current_step: usize,
    current_lr: f64,
}

impl StepScheduler {
    /// Create a new step scheduler
    pub fn new(base_lr: f64, step_size: usize, gamma: f64, warmup_steps: usize) -> Self {
        let mut scheduler = Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            warmup_steps,
            current_step: 0,
            current_lr: base_lr,
        };
        scheduler.current_lr = scheduler.calculate_lr();
        scheduler
    }

    fn calculate_lr(&self) -> f64 {
        warmup_lr(self.base_lr, self.current_step, self.warmup_steps).unwrap_or_else(|| {
            let decays = (self.current_step - self.warmup_steps) / self.step_size;
            self.base_lr * self.gamma.powi(decays as i32)
        })
    }
}

impl Scheduler for StepScheduler {
    fn name(&self) -> &str {
        "step"
    }

    fn step(&mut self) -> f64 {
        self.current_step += 1;
        self.current_lr = self.calculate_lr();
        self.current_lr
    }

    fn get_lr(&self) -> f64 {
        self.current_lr
    }

    fn reset(&mut self) {
        self.current_step = 0;
        self.current_lr = self.calculate_lr();
    }
}

/// Serializable schedule description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchedulerConfig {
    /// Keep the optimizer's learning rate
    Constant,
    /// Linear decay to `min_lr`
    Linear {
        /// Final learning rate
        #[serde(default)]
        min_lr: f64,
        /// Steps until `min_lr` is reached
        total_steps: usize,
        /// Linear warmup steps
        #[serde(default)]
        warmup_steps: usize,
    },
    /// Cosine annealing to `min_lr`
    Cosine {
        /// Final learning rate
        #[serde(default)]
        min_lr: f64,
        /// Steps until `min_lr` is reached
        total_steps: usize,
        /// Linear warmup steps
        #[serde(default)]
        warmup_steps: usize,
    },
    /// Multiply by `gamma` every `step_size` steps
    Step {
        /// Steps between decays
        step_size: usize,
        /// Decay factor
        gamma: f64,
        /// Linear warmup steps
        #[serde(default)]
        warmup_steps: usize,
    },
    /// Multiply by `gamma` every step
    Exponential {
        /// Decay factor
        gamma: f64,
        /// Linear warmup steps
        #[serde(default)]
        warmup_steps: usize,
    },
}

impl SchedulerConfig {
    /// Validate schedule parameters
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Constant => Ok(()),
            Self::Linear {
                total_steps,
                warmup_steps,
                ..
            }
            | Self::Cosine {
                total_steps,
                warmup_steps,
                ..
            } if total_steps <= warmup_steps => Err(Error::config(format!(
                "total_steps ({total_steps}) must exceed warmup_steps ({warmup_steps})"
            ))),
            Self::Step { step_size: 0, .. } => Err(Error::config("step_size must be > 0")),
            Self::Step { gamma, .. } | Self::Exponential { gamma, .. } if *gamma <= 0.0 => {
                Err(Error::config(format!("gamma must be positive, got {gamma}")))
            }
            _ => Ok(()),
        }
    }
}

impl SchedulerFactory for SchedulerConfig {
    fn bind(&self, optimizer: &dyn Optimizer) -> Result<Box<dyn Scheduler>> {
        self.validate()?;
        let base_lr = optimizer.learning_rate();

        let scheduler: Box<dyn Scheduler> = match *self {
            Self::Constant => Box::new(ConstantScheduler::new(base_lr)),
            Self::Linear {
                min_lr,
                total_steps,
                warmup_steps,
            } => Box::new(LinearScheduler::new(base_lr, min_lr, total_steps, warmup_steps)),
            Self::Cosine {
                min_lr,
                total_steps,
                warmup_steps,
            } => Box::new(CosineScheduler::new(base_lr, min_lr, total_steps, warmup_steps)),
            Self::Step {
                step_size,
                gamma,
                warmup_steps,
            } => Box::new(StepScheduler::new(base_lr, step_size, gamma, warmup_steps)),
            Self::Exponential {
                gamma,
                warmup_steps,
            } => Box::new(ExponentialScheduler::new(base_lr, gamma, warmup_steps)),
        };
        Ok(scheduler)
    }
}
