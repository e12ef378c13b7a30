//! trainkit - a generic training loop for candle models
//!
//! The crate drives epochs and batches over user-supplied models, optimizers,
//! schedulers and loss functions, dispatching lifecycle events to callbacks.
//! The work done per batch is a pluggable [`training::Iteration`] strategy;
//! [`training::SupervisedIteration`] covers the common (input, target) case.

#![warn(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod device;
pub mod error;
pub mod logging;
pub mod training;

// Re-exports
pub use config::{DevicePreference, TrainerConfig};
pub use error::{Error, Result};
pub use training::{
    Batch, Callback, CallbackList, DataSource, InterruptHandle, Iteration, IterationOutput,
    SupervisedTrainer, Trainer, TrainerBuilder, TrainerCore,
};
