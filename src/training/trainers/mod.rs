//! Iteration strategies

pub mod supervised;

pub use supervised::{SupervisedIteration, SupervisedTrainer};
