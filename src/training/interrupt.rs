//! Cooperative interruption of a running loop
//!
//! The loop polls the flag before every batch. Setting it from a signal
//! handler or another thread makes the current `train`/`test` return
//! [`Error::Interrupted`](crate::Error::Interrupted).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;

/// Shared interrupt flag
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop before its next batch
    pub fn interrupt(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Reset after an interrupt has been handled
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// Route Ctrl-C to this handle. The process-wide handler can only be
    /// installed once.
    pub fn install_ctrl_c(&self) -> Result<()> {
        let handle = self.clone();
        ctrlc::set_handler(move || {
            warn!("Received Ctrl-C, stopping after the current batch");
            handle.interrupt();
        })?;
        debug!("Ctrl-C handler installed");
        Ok(())
    }
}
