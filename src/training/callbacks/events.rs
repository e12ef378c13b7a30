//! Typed payloads passed to callbacks at each lifecycle hook
//!
//! Each hook gets its own struct with the fields that make sense at that point
//! of the loop. Values registered on the trainer for a hook travel along in
//! `extras`.

use std::collections::BTreeMap;

use candle_core::Tensor;
use serde_json::Value;

use crate::training::data::Batch;
use crate::training::model::ModelGroup;
use crate::training::optimizers::OptimizerGroup;
use crate::training::trainer::TrainerCore;

/// Caller-registered values merged into an event
pub type Extras = BTreeMap<String, Value>;

/// Lifecycle hook points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    /// Before each batch
    StartIteration,
    /// After each batch
    EndIteration,
    /// Before the first batch of an epoch
    StartEpoch,
    /// After the last batch of an epoch
    EndEpoch,
    /// After a completed `run`
    EndAll,
}

/// One extras map per hook
#[derive(Debug, Clone, Default)]
pub struct ExtraRegistry {
    start_iteration: Extras,
    end_iteration: Extras,
    start_epoch: Extras,
    end_epoch: Extras,
    end_all: Extras,
}

impl ExtraRegistry {
    /// Store `value` under `name` for `hook`, replacing any previous value
    pub fn register(&mut self, hook: Hook, name: impl Into<String>, value: impl Into<Value>) {
        self.slot_mut(hook).insert(name.into(), value.into());
    }

    /// Extras registered for `hook`
    pub fn get(&self, hook: Hook) -> &Extras {
        match hook {
            Hook::StartIteration => &self.start_iteration,
            Hook::EndIteration => &self.end_iteration,
            Hook::StartEpoch => &self.start_epoch,
            Hook::EndEpoch => &self.end_epoch,
            Hook::EndAll => &self.end_all,
        }
    }

    fn slot_mut(&mut self, hook: Hook) -> &mut Extras {
        match hook {
            Hook::StartIteration => &mut self.start_iteration,
            Hook::EndIteration => &mut self.end_iteration,
            Hook::StartEpoch => &mut self.start_epoch,
            Hook::EndEpoch => &mut self.end_epoch,
            Hook::EndAll => &mut self.end_all,
        }
    }
}

/// Dispatched before the first batch of an epoch
pub struct EpochStart<'a> {
    /// Model(s) being trained
    pub model: &'a ModelGroup,
    /// Phase name (`"train"`, `"test"`, ...)
    pub name: &'a str,
    /// Trainer state
    pub trainer: &'a TrainerCore,
    /// Registered epoch-start extras
    pub extras: &'a Extras,
}

/// Dispatched before each batch
pub struct IterationStart<'a> {
    /// Model(s) being trained
    pub model: &'a ModelGroup,
    /// Global step counter
    pub step: usize,
    /// Phase name
    pub name: &'a str,
    /// Trainer state
    pub trainer: &'a TrainerCore,
    /// Registered iteration-start extras
    pub extras: &'a Extras,
}

/// Dispatched after each batch
pub struct IterationEnd<'a> {
    /// Model output, detached from the graph and copied to the CPU
    pub output: &'a Tensor,
    /// The input batch as produced by the data source
    pub data: &'a Batch,
    /// Model(s) being trained
    pub model: &'a ModelGroup,
    /// Scalar loss value
    pub loss: f64,
    /// Global step counter, before this batch's increment
    pub step: usize,
    /// Phase name
    pub name: &'a str,
    /// Trainer state
    pub trainer: &'a TrainerCore,
    /// Registered iteration-end extras
    pub extras: &'a Extras,
}

/// Dispatched after the last batch of an epoch
pub struct EpochEnd<'a> {
    /// Model(s) being trained
    pub model: &'a ModelGroup,
    /// Optimizer(s)
    pub optimizer: &'a OptimizerGroup,
    /// Epoch counter
    pub epoch: usize,
    /// Phase name
    pub name: &'a str,
    /// Length of the data source
    pub iter_per_epoch: usize,
    /// Trainer state
    pub trainer: &'a TrainerCore,
    /// Registered epoch-end extras
    pub extras: &'a Extras,
}

/// Dispatched once after all epochs of a `run`
pub struct RunEnd<'a> {
    /// Model(s) being trained
    pub model: &'a ModelGroup,
    /// Optimizer(s)
    pub optimizer: &'a OptimizerGroup,
    /// Trainer state
    pub trainer: &'a TrainerCore,
    /// Registered end-of-run extras
    pub extras: &'a Extras,
}

macro_rules! impl_extra_lookup {
    ($($event:ident),*) => {
        $(
            impl $event<'_> {
                /// Registered extra value under `name`
                pub fn extra(&self, name: &str) -> Option<&Value> {
                    self.extras.get(name)
                }
            }
        )*
    };
}

impl_extra_lookup!(EpochStart, IterationStart, IterationEnd, EpochEnd, RunEnd);
