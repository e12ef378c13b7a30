//! Lifecycle callbacks
//!
//! Implement [`Callback`] to observe the training loop. Every hook has a no-op
//! default, so a callback only overrides the events it cares about. Returning
//! an error from a hook aborts the loop and the error reaches the caller of
//! `train`, `test` or `run`.
//!
//! [`CallbackList`] dispatches to callbacks in insertion order and is itself a
//! `Callback`, so lists nest.

pub mod events;
pub mod history;
pub mod logging;

pub use events::{
    EpochEnd, EpochStart, ExtraRegistry, Extras, Hook, IterationEnd, IterationStart, RunEnd,
};
pub use history::{HistoryHandle, Metric, MetricHistory};
pub use logging::LoggingCallback;

use tracing::debug;

use crate::error::Result;

/// Trait for training callbacks
pub trait Callback {
    /// Called before each batch
    fn start_iteration(&mut self, _event: &IterationStart<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after each batch
    fn end_iteration(&mut self, _event: &IterationEnd<'_>) -> Result<()> {
        Ok(())
    }

    /// Called before each epoch
    fn start_epoch(&mut self, _event: &EpochStart<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after each epoch
    fn end_epoch(&mut self, _event: &EpochEnd<'_>) -> Result<()> {
        Ok(())
    }

    /// Called once after a completed run
    fn end_all(&mut self, _event: &RunEnd<'_>) -> Result<()> {
        Ok(())
    }

    /// Release resources; called when a run ends, however it ends
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Callback name for logging
    fn name(&self) -> &str {
        "callback"
    }
}

/// Ordered collection of callbacks
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
    closed: bool,
}

impl CallbackList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback, builder style
    pub fn with<C: Callback + 'static>(mut self, callback: C) -> Self {
        self.add(callback);
        self
    }

    /// Add a callback
    pub fn add<C: Callback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Get number of callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    /// Check if no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Whether `close` has run
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Callback for CallbackList {
    fn start_iteration(&mut self, event: &IterationStart<'_>) -> Result<()> {
        for callback in &mut self.callbacks {
            callback.start_iteration(event)?;
        }
        Ok(())
    }

    fn end_iteration(&mut self, event: &IterationEnd<'_>) -> Result<()> {
        for callback in &mut self.callbacks {
            callback.end_iteration(event)?;
        }
        Ok(())
    }

    fn start_epoch(&mut self, event: &EpochStart<'_>) -> Result<()> {
        for callback in &mut self.callbacks {
            callback.start_epoch(event)?;
        }
        Ok(())
    }

    fn end_epoch(&mut self, event: &EpochEnd<'_>) -> Result<()> {
        for callback in &mut self.callbacks {
            callback.end_epoch(event)?;
        }
        Ok(())
    }

    fn end_all(&mut self, event: &RunEnd<'_>) -> Result<()> {
        for callback in &mut self.callbacks {
            callback.end_all(event)?;
        }
        Ok(())
    }

    /// Close every callback once. All callbacks are closed even if one fails;
    /// the first error is returned.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut first_error = None;
        for callback in &mut self.callbacks {
            debug!("Closing callback {}", callback.name());
            if let Err(err) = callback.close() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn name(&self) -> &str {
        "callback_list"
    }
}
