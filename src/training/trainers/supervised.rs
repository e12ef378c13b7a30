//! Supervised learning on (input, target) batches

use candle_core::Tensor;
use tracing::debug;

use crate::error::{Error, Result};
use crate::training::data::Batch;
use crate::training::trainer::{Iteration, IterationOutput, Trainer, TrainerBuilder, TrainerCore};

/// Forward, loss and, in train mode, one optimizer step per batch
#[derive(Debug, Clone, Copy, Default)]
pub struct SupervisedIteration;

/// Trainer running [`SupervisedIteration`]
pub type SupervisedTrainer = Trainer<SupervisedIteration>;

impl Iteration for SupervisedIteration {
    fn validate(&self, core: &TrainerCore) -> Result<()> {
        if core.model().is_keyed() {
            return Err(Error::unsupported(
                "supervised training expects a single model, not a keyed collection",
            ));
        }
        if core.loss().is_keyed() {
            return Err(Error::unsupported(
                "supervised training expects a single loss function, not a keyed collection",
            ));
        }
        Ok(())
    }

    fn run_iteration(&mut self, core: &mut TrainerCore, batch: &Batch) -> Result<IterationOutput> {
        let tensors = core
            .to_device(batch.tensors())
            .collect::<Result<Vec<Tensor>>>()?;
        let [input, target] = <[Tensor; 2]>::try_from(tensors).map_err(|tensors| {
            Error::invalid_batch(format!(
                "expected (input, target), got {} tensors",
                tensors.len()
            ))
        })?;

        let model = core
            .model()
            .as_single()
            .ok_or_else(|| Error::unsupported("keyed model"))?;
        let loss_fn = core
            .loss()
            .as_single()
            .ok_or_else(|| Error::unsupported("keyed loss"))?;

        let output = model.forward(&input)?;
        let loss = loss_fn.compute(&output, &target)?;

        if !core.is_train() {
            return Ok(IterationOutput {
                loss: loss.detach(),
                output: output.detach(),
            });
        }

        let optimizer = core.optimizer_mut();
        optimizer.zero_grad()?;
        let grads = loss.backward()?;
        optimizer.step(&grads)?;
        debug!("Applied optimizer step");

        Ok(IterationOutput { loss, output })
    }
}

impl TrainerBuilder {
    /// Build a [`SupervisedTrainer`]
    pub fn build_supervised(self) -> Result<SupervisedTrainer> {
        self.build(SupervisedIteration)
    }
}
