//! Generic training loop
//!
//! [`Trainer`] owns the model(s), optimizer(s), optional scheduler(s) and loss
//! function(s) and drives a lifecycle of epochs and batches, dispatching
//! callback events along the way. What happens inside one batch is delegated
//! to an [`Iteration`] strategy.

use candle_core::{Device, Tensor};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::TrainerConfig;
use crate::device;
use crate::error::{Error, Result};
use crate::training::callbacks::{
    Callback, CallbackList, EpochEnd, EpochStart, ExtraRegistry, Extras, Hook, IterationEnd,
    IterationStart, RunEnd,
};
use crate::training::data::{Batch, DataSource};
use crate::training::group::Group;
use crate::training::interrupt::InterruptHandle;
use crate::training::loss::{scalar_value, LossFn, LossGroup};
use crate::training::model::{Model, ModelGroup};
use crate::training::optimizers::{
    OptimizerFactory, OptimizerFactoryGroup, OptimizerGroup, SchedulerFactory,
    SchedulerFactoryGroup, SchedulerGroup,
};
use crate::training::progress;
use crate::training::TRAIN;

/// Whether the trainer is fitting or evaluating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Trainer state visible to iteration strategies and callbacks
pub struct TrainerCore {
    model: ModelGroup,
    optimizer: OptimizerGroup,
    scheduler: Option<SchedulerGroup>,
    loss: LossGroup,
    device: Device,
    step: usize,
    epoch: usize,
    mode: Mode,
}

impl TrainerCore {
    pub fn model(&self) -> &ModelGroup {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ModelGroup {
        &mut self.model
    }

    pub fn optimizer(&self) -> &OptimizerGroup {
        &self.optimizer
    }

    pub fn optimizer_mut(&mut self) -> &mut OptimizerGroup {
        &mut self.optimizer
    }

    pub fn scheduler(&self) -> Option<&SchedulerGroup> {
        self.scheduler.as_ref()
    }

    pub fn loss(&self) -> &LossGroup {
        &self.loss
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of training batches processed so far
    pub fn step(&self) -> usize {
        self.step
    }

    /// Number of completed training epochs
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn is_train(&self) -> bool {
        self.mode == Mode::Train
    }

    /// Lazily move each tensor to the trainer's device
    pub fn to_device<'a>(
        &'a self,
        tensors: &'a [Tensor],
    ) -> impl Iterator<Item = Result<Tensor>> + 'a {
        tensors
            .iter()
            .map(move |tensor| Ok(tensor.to_device(&self.device)?))
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        self.model.set_training(mode == Mode::Train);
    }

    /// Step every scheduler once and push the new rate into its optimizer
    fn step_schedulers(&mut self) {
        let Some(schedulers) = self.scheduler.as_mut() else {
            return;
        };
        match schedulers {
            Group::Single(scheduler) => {
                let lr = scheduler.step();
                if let Some(optimizer) = self.optimizer.as_single_mut() {
                    optimizer.set_learning_rate(lr);
                }
                debug!("Scheduler {} set learning rate to {:.3e}", scheduler.name(), lr);
            }
            Group::Keyed(schedulers) => {
                for (key, scheduler) in schedulers.iter_mut() {
                    let lr = scheduler.step();
                    if let Some(optimizer) = self.optimizer.get_mut(key) {
                        optimizer.set_learning_rate(lr);
                    }
                    debug!("Scheduler {key} set learning rate to {:.3e}", lr);
                }
            }
        }
    }
}

/// Result of processing one batch
#[derive(Debug, Clone)]
pub struct IterationOutput {
    /// Scalar loss tensor
    pub loss: Tensor,
    /// Model output
    pub output: Tensor,
}

/// Per-batch work of a trainer
pub trait Iteration {
    /// Check that the trainer configuration suits this strategy
    fn validate(&self, _core: &TrainerCore) -> Result<()> {
        Ok(())
    }

    /// Process one batch. In train mode this is expected to update the
    /// parameters; in eval mode it must not.
    fn run_iteration(&mut self, core: &mut TrainerCore, batch: &Batch) -> Result<IterationOutput>;
}

/// Builder collecting everything a [`Trainer`] needs
pub struct TrainerBuilder {
    model: ModelGroup,
    optimizer: OptimizerFactoryGroup,
    loss: LossGroup,
    scheduler: Option<SchedulerFactoryGroup>,
    callbacks: CallbackList,
    config: TrainerConfig,
    interrupt: InterruptHandle,
}

impl TrainerBuilder {
    /// Single model, optimizer and loss
    pub fn new(
        model: impl Model + 'static,
        optimizer: impl OptimizerFactory + 'static,
        loss: impl LossFn + 'static,
    ) -> Self {
        Self::from_groups(
            Group::single(Box::new(model) as Box<dyn Model>),
            Group::single(Box::new(optimizer) as Box<dyn OptimizerFactory>),
            Group::single(Box::new(loss) as Box<dyn LossFn>),
        )
    }

    /// Any combination of single and keyed components
    pub fn from_groups(
        model: ModelGroup,
        optimizer: OptimizerFactoryGroup,
        loss: LossGroup,
    ) -> Self {
        Self {
            model,
            optimizer,
            loss,
            scheduler: None,
            callbacks: CallbackList::new(),
            config: TrainerConfig::default(),
            interrupt: InterruptHandle::new(),
        }
    }

    /// One scheduler; with keyed optimizers it is bound once per key
    pub fn scheduler(mut self, scheduler: impl SchedulerFactory + 'static) -> Self {
        self.scheduler = Some(Group::single(
            Box::new(scheduler) as Box<dyn SchedulerFactory>
        ));
        self
    }

    pub fn schedulers(mut self, schedulers: SchedulerFactoryGroup) -> Self {
        self.scheduler = Some(schedulers);
        self
    }

    /// Append one callback
    pub fn callback(mut self, callback: impl Callback + 'static) -> Self {
        self.callbacks.add(callback);
        self
    }

    /// Append an already-composed list
    pub fn callbacks(mut self, callbacks: CallbackList) -> Self {
        if self.callbacks.is_empty() {
            self.callbacks = callbacks;
        } else {
            self.callbacks.add(callbacks);
        }
        self
    }

    pub fn config(mut self, config: TrainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing interrupt handle, e.g. one a callback already holds
    pub fn interrupt(mut self, handle: InterruptHandle) -> Self {
        self.interrupt = handle;
        self
    }

    /// Validate the configuration, pick a device, bind optimizers and
    /// schedulers and hand the result to `strategy`.
    pub fn build<I: Iteration>(self, strategy: I) -> Result<Trainer<I>> {
        let Self {
            mut model,
            optimizer,
            loss,
            scheduler,
            callbacks,
            config,
            interrupt,
        } = self;

        config.validate()?;
        check_shapes(&model, &optimizer, scheduler.as_ref())?;

        let device = device::select_device(config.device)?;
        if device::is_accelerator(&device) && config.autotune {
            device::enable_autotune();
        }
        model.to_device(&device)?;

        let mut optimizer = bind_optimizers(optimizer, &model)?;
        let scheduler = scheduler
            .map(|factories| bind_schedulers(factories, &mut optimizer))
            .transpose()?;

        let core = TrainerCore {
            model,
            optimizer,
            scheduler,
            loss,
            device,
            step: 0,
            epoch: 0,
            mode: Mode::Train,
        };
        strategy.validate(&core)?;

        info!(
            "Trainer ready: {} model(s), {} optimizer(s) on {}",
            core.model.len(),
            core.optimizer.len(),
            device::describe(&core.device)
        );
        if core.scheduler.is_none() {
            debug!("No learning rate scheduler configured");
        }

        Ok(Trainer {
            core,
            strategy,
            callbacks,
            extras: ExtraRegistry::default(),
            config,
            interrupt,
        })
    }
}

fn check_shapes(
    model: &ModelGroup,
    optimizer: &OptimizerFactoryGroup,
    scheduler: Option<&SchedulerFactoryGroup>,
) -> Result<()> {
    if optimizer.is_keyed() && !model.is_keyed() {
        return Err(Error::config("optimizer is keyed but model is not"));
    }
    optimizer.ensure_keys_in(model, "models")?;

    if let Some(scheduler) = scheduler {
        if scheduler.is_keyed() && !optimizer.is_keyed() {
            return Err(Error::config("scheduler is keyed but optimizer is not"));
        }
        scheduler.ensure_keys_in(optimizer, "optimizers")?;
    }
    Ok(())
}

fn bind_optimizers(factories: OptimizerFactoryGroup, model: &ModelGroup) -> Result<OptimizerGroup> {
    match factories {
        Group::Single(factory) => Ok(Group::Single(factory.bind(model.all_vars())?)),
        keyed => keyed.try_map(|key, factory| {
            let key = key.unwrap_or_default();
            let model = model
                .get(key)
                .ok_or_else(|| Error::missing_key(key, "models"))?;
            factory.bind(model.vars())
        }),
    }
}

fn bind_schedulers(
    factories: SchedulerFactoryGroup,
    optimizer: &mut OptimizerGroup,
) -> Result<SchedulerGroup> {
    let schedulers = match (factories, &*optimizer) {
        (Group::Single(factory), Group::Single(optimizer)) => {
            Group::Single(factory.bind(optimizer.as_ref())?)
        }
        (Group::Single(factory), Group::Keyed(optimizers)) => Group::Keyed(
            optimizers
                .iter()
                .map(|(key, optimizer)| Ok((key.clone(), factory.bind(optimizer.as_ref())?)))
                .collect::<Result<_>>()?,
        ),
        (keyed, optimizers) => keyed.try_map(|key, factory| {
            let key = key.unwrap_or_default();
            let optimizer = optimizers
                .get(key)
                .ok_or_else(|| Error::missing_key(key, "optimizers"))?;
            factory.bind(optimizer.as_ref())
        })?,
    };

    for (key, scheduler) in schedulers.iter() {
        let target = match key {
            Some(key) => optimizer.get_mut(key),
            None => optimizer.as_single_mut(),
        };
        if let Some(target) = target {
            target.set_learning_rate(scheduler.get_lr());
        }
    }
    Ok(schedulers)
}

/// Training loop over an [`Iteration`] strategy
pub struct Trainer<I> {
    core: TrainerCore,
    strategy: I,
    callbacks: CallbackList,
    extras: ExtraRegistry,
    config: TrainerConfig,
    interrupt: InterruptHandle,
}

impl<I: Iteration> Trainer<I> {
    /// One training epoch over `data`, then one scheduler step
    pub fn train<D: DataSource + ?Sized>(&mut self, data: &D) -> Result<()> {
        self.core.set_mode(Mode::Train);
        self.run_loop(data, TRAIN)?;
        self.core.step_schedulers();
        self.core.epoch += 1;
        Ok(())
    }

    /// One evaluation pass over `data` under the configured test name
    pub fn test<D: DataSource + ?Sized>(&mut self, data: &D) -> Result<()> {
        let name = self.config.test_name.clone();
        self.test_named(data, &name)
    }

    /// One evaluation pass labelled `name`
    pub fn test_named<D: DataSource + ?Sized>(&mut self, data: &D, name: &str) -> Result<()> {
        if name == TRAIN {
            return Err(Error::config(format!(
                "phase name `{TRAIN}` is reserved for training"
            )));
        }
        self.core.set_mode(Mode::Eval);
        self.run_loop(data, name)
    }

    /// Alternate `train` and `test` for `epochs` epochs, then dispatch
    /// `end_all`.
    ///
    /// An interrupt ends the run early without an error. Callbacks are closed
    /// exactly once whichever way the run ends, so a trainer runs once: a
    /// second call fails with [`Error::Config`].
    pub fn run<D1, D2>(&mut self, epochs: usize, train_data: &D1, test_data: &D2) -> Result<()>
    where
        D1: DataSource + ?Sized,
        D2: DataSource + ?Sized,
    {
        if self.callbacks.is_closed() {
            return Err(Error::config(
                "callbacks are already closed; build a new trainer for another run",
            ));
        }
        let outcome = self.run_epochs(epochs, train_data, test_data);
        let closed = self.callbacks.close();

        match outcome {
            Ok(()) => closed,
            Err(Error::Interrupted) => {
                warn!(
                    "Training interrupted at epoch {} (step {})",
                    self.core.epoch, self.core.step
                );
                self.interrupt.clear();
                closed
            }
            Err(err) => {
                if let Err(close_err) = closed {
                    error!("Failed to close callbacks: {close_err}");
                }
                Err(err)
            }
        }
    }

    fn run_epochs<D1, D2>(&mut self, epochs: usize, train_data: &D1, test_data: &D2) -> Result<()>
    where
        D1: DataSource + ?Sized,
        D2: DataSource + ?Sized,
    {
        info!("Starting training for {epochs} epochs");
        for epoch in 1..=epochs {
            debug!("Epoch {epoch}/{epochs}");
            self.train(train_data)?;
            self.test(test_data)?;
        }
        if self.interrupt.is_interrupted() {
            return Err(Error::Interrupted);
        }

        let event = RunEnd {
            model: &self.core.model,
            optimizer: &self.core.optimizer,
            trainer: &self.core,
            extras: self.extras.get(Hook::EndAll),
        };
        self.callbacks.end_all(&event)
    }

    fn run_loop<D: DataSource + ?Sized>(&mut self, data: &D, name: &str) -> Result<()> {
        let event = EpochStart {
            model: &self.core.model,
            name,
            trainer: &self.core,
            extras: self.extras.get(Hook::StartEpoch),
        };
        self.callbacks.start_epoch(&event)?;

        let iter_per_epoch = data.len();
        for batch in progress::decorate(data.iter(), iter_per_epoch, name, self.config.verbose) {
            if self.interrupt.is_interrupted() {
                return Err(Error::Interrupted);
            }
            let batch = batch?;
            self.iterate(&batch, name)?;
            // a batch interrupted mid-way does not count as a step
            if self.interrupt.is_interrupted() {
                return Err(Error::Interrupted);
            }
            if self.core.is_train() {
                self.core.step += 1;
            }
        }

        let event = EpochEnd {
            model: &self.core.model,
            optimizer: &self.core.optimizer,
            epoch: self.core.epoch,
            name,
            iter_per_epoch,
            trainer: &self.core,
            extras: self.extras.get(Hook::EndEpoch),
        };
        self.callbacks.end_epoch(&event)
    }

    fn iterate(&mut self, batch: &Batch, name: &str) -> Result<()> {
        let event = IterationStart {
            model: &self.core.model,
            step: self.core.step,
            name,
            trainer: &self.core,
            extras: self.extras.get(Hook::StartIteration),
        };
        self.callbacks.start_iteration(&event)?;

        let IterationOutput { loss, output } = self.strategy.run_iteration(&mut self.core, batch)?;
        let output = output.detach().to_device(&Device::Cpu)?;
        let loss = scalar_value(&loss)?;

        let event = IterationEnd {
            output: &output,
            data: batch,
            model: &self.core.model,
            loss,
            step: self.core.step,
            name,
            trainer: &self.core,
            extras: self.extras.get(Hook::EndIteration),
        };
        self.callbacks.end_iteration(&event)
    }
}

impl<I> Trainer<I> {
    pub fn register_start_iteration(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extras.register(Hook::StartIteration, name, value);
    }

    pub fn register_end_iteration(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extras.register(Hook::EndIteration, name, value);
    }

    pub fn register_start_epoch(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extras.register(Hook::StartEpoch, name, value);
    }

    pub fn register_end_epoch(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extras.register(Hook::EndEpoch, name, value);
    }

    pub fn register_end_all(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.extras.register(Hook::EndAll, name, value);
    }

    /// Extras registered for `hook`
    pub fn extras(&self, hook: Hook) -> &Extras {
        self.extras.get(hook)
    }

    pub fn step(&self) -> usize {
        self.core.step
    }

    pub fn epoch(&self) -> usize {
        self.core.epoch
    }

    pub fn is_train(&self) -> bool {
        self.core.is_train()
    }

    pub fn device(&self) -> &Device {
        &self.core.device
    }

    pub fn core(&self) -> &TrainerCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut TrainerCore {
        &mut self.core
    }

    pub fn strategy(&self) -> &I {
        &self.strategy
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn callbacks(&self) -> &CallbackList {
        &self.callbacks
    }

    /// Handle that stops the loop at the next batch boundary
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Learning rate of the single optimizer; `None` when optimizers are keyed
    pub fn learning_rate(&self) -> Option<f64> {
        self.core
            .optimizer
            .as_single()
            .map(|optimizer| optimizer.learning_rate())
    }

    pub fn learning_rates(&self) -> Group<f64> {
        self.core.optimizer.learning_rates()
    }

    /// Lazily move each tensor to the trainer's device
    pub fn to_device<'a>(
        &'a self,
        tensors: &'a [Tensor],
    ) -> impl Iterator<Item = Result<Tensor>> + 'a {
        self.core.to_device(tensors)
    }

    /// Close callbacks outside of `run`; later calls do nothing
    pub fn close(&mut self) -> Result<()> {
        self.callbacks.close()
    }
}
