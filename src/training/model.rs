//! Model abstraction consumed by the trainer
//!
//! A [`Model`] only has to run a forward pass, switch between training and
//! evaluation behaviour, move itself to a device and expose its trainable
//! variables. [`ModuleModel`] adapts any `candle_nn::ModuleT` built from a
//! `VarMap`; [`FnModel`] wraps a parameter-free closure.

use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{ModuleT, VarBuilder, VarMap};

use super::group::Group;
use crate::error::Result;

/// A trainable model
pub trait Model {
    /// Forward computation
    fn forward(&self, xs: &Tensor) -> Result<Tensor>;

    /// Switch between training (`true`) and evaluation (`false`) behaviour
    fn set_training(&mut self, training: bool);

    /// Current mode
    fn is_training(&self) -> bool;

    /// Move all parameters to `device`
    fn to_device(&mut self, device: &Device) -> Result<()>;

    /// Trainable variables
    fn vars(&self) -> Vec<Var>;
}

/// Models handed to a trainer
pub type ModelGroup = Group<Box<dyn Model>>;

impl Group<Box<dyn Model>> {
    /// Set training or evaluation mode on every model
    pub fn set_training(&mut self, training: bool) {
        for model in self.values_mut() {
            model.set_training(training);
        }
    }

    /// Whether every model is in training mode
    pub fn is_training(&self) -> bool {
        self.iter().all(|(_, model)| model.is_training())
    }

    /// Move every model to `device`
    pub fn to_device(&mut self, device: &Device) -> Result<()> {
        for model in self.values_mut() {
            model.to_device(device)?;
        }
        Ok(())
    }

    /// Variables of every model, in key order
    pub fn all_vars(&self) -> Vec<Var> {
        self.iter().flat_map(|(_, model)| model.vars()).collect()
    }
}

type BuildFn<M> = Box<dyn Fn(VarBuilder) -> candle_core::Result<M>>;

/// A candle module together with the `VarMap` holding its parameters
pub struct ModuleModel<M> {
    varmap: VarMap,
    dtype: DType,
    device: Device,
    build: BuildFn<M>,
    module: M,
    training: bool,
}

impl<M: ModuleT> ModuleModel<M> {
    /// Build a module on `device` with freshly initialized parameters.
    ///
    /// `build` is kept so the module can be rebuilt against moved parameters
    /// by [`Model::to_device`].
    pub fn new<F>(dtype: DType, device: &Device, build: F) -> Result<Self>
    where
        F: Fn(VarBuilder) -> candle_core::Result<M> + 'static,
    {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);
        let module = build(vb)?;
        Ok(Self {
            varmap,
            dtype,
            device: device.clone(),
            build: Box::new(build),
            module,
            training: true,
        })
    }

    /// The wrapped module
    pub fn module(&self) -> &M {
        &self.module
    }

    /// The parameter map
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Device the parameters currently live on
    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl<M: ModuleT> Model for ModuleModel<M> {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(self.module.forward_t(xs, self.training)?)
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn to_device(&mut self, device: &Device) -> Result<()> {
        if self.device.same_device(device) {
            return Ok(());
        }

        let moved = VarMap::new();
        {
            let source = self
                .varmap
                .data()
                .lock()
                .map_err(|err| anyhow::anyhow!("parameter map poisoned: {err}"))?;
            let mut target = moved
                .data()
                .lock()
                .map_err(|err| anyhow::anyhow!("parameter map poisoned: {err}"))?;
            for (name, var) in source.iter() {
                let tensor = var.as_tensor().to_device(device)?;
                target.insert(name.clone(), Var::from_tensor(&tensor)?);
            }
        }

        let vb = VarBuilder::from_varmap(&moved, self.dtype, device);
        self.module = (self.build)(vb)?;
        self.varmap = moved;
        self.device = device.clone();
        Ok(())
    }

    fn vars(&self) -> Vec<Var> {
        self.varmap.all_vars()
    }
}

/// A parameter-free model defined by a closure
pub struct FnModel<F> {
    forward: F,
    training: bool,
}

impl<F> FnModel<F>
where
    F: Fn(&Tensor) -> candle_core::Result<Tensor>,
{
    /// Wrap a forward closure
    pub fn new(forward: F) -> Self {
        Self {
            forward,
            training: true,
        }
    }
}

/// The identity model
pub fn identity() -> FnModel<fn(&Tensor) -> candle_core::Result<Tensor>> {
    fn pass_through(xs: &Tensor) -> candle_core::Result<Tensor> {
        Ok(xs.clone())
    }
    FnModel::new(pass_through as fn(&Tensor) -> candle_core::Result<Tensor>)
}

impl<F> Model for FnModel<F>
where
    F: Fn(&Tensor) -> candle_core::Result<Tensor>,
{
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok((self.forward)(xs)?)
    }

    fn set_training(&mut self, training: bool) {
        self.training = training;
    }

    fn is_training(&self) -> bool {
        self.training
    }

    fn to_device(&mut self, _device: &Device) -> Result<()> {
        Ok(())
    }

    fn vars(&self) -> Vec<Var> {
        Vec::new()
    }
}
