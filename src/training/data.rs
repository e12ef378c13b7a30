//! Batches and data sources consumed by the training loop
//!
//! The loop only needs two things from a data source: how many batches it
//! yields and a fresh iterator over them for every epoch.

use candle_core::Tensor;

use crate::error::{Error, Result};

/// A single batch: an ordered tuple of tensors
#[derive(Debug, Clone)]
pub struct Batch {
    tensors: Vec<Tensor>,
}

impl Batch {
    /// Create a batch from its tensors
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self { tensors }
    }

    /// Number of tensors in the batch
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    /// Check if the batch holds no tensors
    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Borrow the tensors
    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Tensor at `index`
    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.tensors.get(index)
    }

    /// Number of samples, taken from the leading dimension of the first tensor
    pub fn batch_size(&self) -> Result<usize> {
        let first = self
            .tensors
            .first()
            .ok_or_else(|| Error::invalid_batch("batch is empty"))?;
        Ok(first.dim(0)?)
    }
}

impl From<(Tensor, Tensor)> for Batch {
    fn from((input, target): (Tensor, Tensor)) -> Self {
        Self::new(vec![input, target])
    }
}

impl From<Vec<Tensor>> for Batch {
    fn from(tensors: Vec<Tensor>) -> Self {
        Self::new(tensors)
    }
}

/// Finite, re-iterable source of batches
pub trait DataSource {
    /// Number of batches one pass yields
    fn len(&self) -> usize;

    /// Check if the source yields nothing
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a new pass over the batches
    fn iter(&self) -> Box<dyn Iterator<Item = Result<Batch>> + '_>;
}

impl DataSource for [Batch] {
    fn len(&self) -> usize {
        <[Batch]>::len(self)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        Box::new(<[Batch]>::iter(self).cloned().map(Ok))
    }
}

impl DataSource for Vec<Batch> {
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = Result<Batch>> + '_> {
        DataSource::iter(self.as_slice())
    }
}

/// Split paired `inputs` and `targets` along the first dimension into batches
/// of at most `batch_size` samples.
pub fn paired_batches(inputs: &Tensor, targets: &Tensor, batch_size: usize) -> Result<Vec<Batch>> {
    if batch_size == 0 {
        return Err(Error::config("batch size must be positive"));
    }
    let samples = inputs.dim(0)?;
    if targets.dim(0)? != samples {
        return Err(Error::invalid_batch(format!(
            "inputs have {samples} samples but targets have {}",
            targets.dim(0)?
        )));
    }

    let mut batches = Vec::with_capacity(samples.div_ceil(batch_size));
    let mut start = 0;
    while start < samples {
        let len = batch_size.min(samples - start);
        batches.push(Batch::from((
            inputs.narrow(0, start, len)?,
            targets.narrow(0, start, len)?,
        )));
        start += len;
    }
    Ok(batches)
}
