//! Training infrastructure
//!
//! # Main Components
//!
//! - **Trainer**: generic epoch/batch loop with callback dispatch
//! - **Iteration strategies**: per-batch work, e.g. supervised learning
//! - **Groups**: single or keyed models, optimizers, schedulers and losses
//! - **Optimizers**: SGD and AdamW with learning rate scheduling
//! - **Callbacks**: lifecycle hooks, logging and metric history
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use trainkit::training::{MseLoss, Sgd, TrainerBuilder};
//!
//! let mut trainer = TrainerBuilder::new(model, Sgd::new(0.01), MseLoss)
//!     .callback(LoggingCallback::new())
//!     .build_supervised()?;
//!
//! trainer.run(10, &train_batches, &test_batches)?;
//! ```

pub mod callbacks;
pub mod data;
pub mod group;
pub mod interrupt;
pub mod loss;
pub mod model;
pub mod optimizers;
pub mod progress;
pub mod trainer;
pub mod trainers;

#[cfg(test)]
mod tests;

/// Phase name of training epochs
pub const TRAIN: &str = "train";

/// Default phase name of evaluation epochs
pub const TEST: &str = "test";

// Re-exports
pub use callbacks::{
    Callback, CallbackList, EpochEnd, EpochStart, Extras, HistoryHandle, Hook, IterationEnd,
    IterationStart, LoggingCallback, Metric, MetricHistory, RunEnd,
};
pub use data::{paired_batches, Batch, DataSource};
pub use group::Group;
pub use interrupt::InterruptHandle;
pub use loss::{CrossEntropyLoss, LossFn, LossGroup, MseLoss};
pub use model::{identity, FnModel, Model, ModelGroup, ModuleModel};
pub use optimizers::{
    AdamW, Optimizer, OptimizerConfig, OptimizerFactory, OptimizerGroup, Scheduler,
    SchedulerConfig, SchedulerFactory, Sgd,
};
pub use trainer::{Iteration, IterationOutput, Mode, Trainer, TrainerBuilder, TrainerCore};
pub use trainers::{SupervisedIteration, SupervisedTrainer};
