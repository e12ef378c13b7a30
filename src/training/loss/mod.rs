//! Loss functions
//!
//! A [`LossFn`] maps a model output and a target to a scalar tensor that can
//! be backpropagated. Closures with the matching signature are loss functions
//! too, so `candle_nn::loss::mse` can be passed directly.
//!
//! ```rust,ignore
//! use trainkit::training::loss::{LossFn, MseLoss};
//!
//! let loss = MseLoss.compute(&output, &target)?;
//! let value = trainkit::training::loss::scalar_value(&loss)?;
//! ```

pub mod supervised;

pub use supervised::{CrossEntropyLoss, MseLoss};

use candle_core::{DType, Tensor, D};

use super::group::Group;
use crate::error::{Error, Result};

/// A differentiable loss
pub trait LossFn {
    /// Compute the loss of `output` against `target`
    fn compute(&self, output: &Tensor, target: &Tensor) -> Result<Tensor>;

    /// Name used in logs
    fn name(&self) -> &str {
        "loss"
    }
}

impl<F> LossFn for F
where
    F: Fn(&Tensor, &Tensor) -> candle_core::Result<Tensor>,
{
    fn compute(&self, output: &Tensor, target: &Tensor) -> Result<Tensor> {
        Ok(self(output, target)?)
    }
}

/// Loss functions handed to a trainer
pub type LossGroup = Group<Box<dyn LossFn>>;

/// Extract the value of a scalar loss tensor as `f64`.
///
/// Single-element tensors of any rank are accepted; an unreduced loss is an
/// error.
pub fn scalar_value(loss: &Tensor) -> Result<f64> {
    if loss.elem_count() != 1 {
        return Err(Error::invalid_batch(format!(
            "loss must be a single value, got shape {:?}",
            loss.dims()
        )));
    }
    Ok(loss.to_dtype(DType::F64)?.flatten_all()?.get(0)?.to_scalar::<f64>()?)
}

/// Number of rows of `output` whose argmax equals the integer `target`
pub fn correct_predictions(output: &Tensor, target: &Tensor) -> Result<usize> {
    let predictions = output.argmax(D::Minus1)?;
    let target = target.to_dtype(DType::U32)?;
    let correct = predictions
        .eq(&target)?
        .to_dtype(DType::F64)?
        .sum_all()?
        .to_scalar::<f64>()?;
    Ok(correct as usize)
}
