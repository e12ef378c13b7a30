//! Configuration structures for the trainer

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Trainer configuration
///
/// Everything a trainer can be tuned with is declared here; there is no
/// free-form attribute bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Decorate every epoch with a progress bar
    pub verbose: bool,
    /// Where models and batches are placed
    pub device: DevicePreference,
    /// Enable backend autotuning when an accelerator is selected. On CUDA
    /// this turns on reduced-precision f32 GEMM, trading accuracy for speed.
    /// Off by default.
    pub autotune: bool,
    /// Phase name used by `Trainer::test`
    pub test_name: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            verbose: true,
            device: DevicePreference::Auto,
            autotune: false,
            test_name: crate::training::TEST.to_string(),
        }
    }
}

impl TrainerConfig {
    /// Load configuration from a JSON or YAML file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            other => {
                return Err(Error::config(format!(
                    "Unsupported config file extension: {:?}",
                    other
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.test_name.is_empty() {
            return Err(Error::config("test_name must not be empty"));
        }
        if self.test_name == crate::training::TRAIN {
            return Err(Error::config(
                "test_name must differ from the training phase name",
            ));
        }

        match self.device {
            DevicePreference::Cuda(_) if !cfg!(feature = "cuda") => Err(Error::config(
                "CUDA device requested but trainkit was built without the `cuda` feature",
            )),
            DevicePreference::Metal(_) if !cfg!(feature = "metal") => Err(Error::config(
                "Metal device requested but trainkit was built without the `metal` feature",
            )),
            _ => Ok(()),
        }
    }

    /// Disable progress bars
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Set the device preference
    pub fn with_device(mut self, device: DevicePreference) -> Self {
        self.device = device;
        self
    }
}

/// Device placement preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// CUDA ordinal 0 if available, CPU otherwise
    Auto,
    /// Always CPU
    Cpu,
    /// A specific CUDA ordinal
    Cuda(usize),
    /// A specific Metal ordinal
    Metal(usize),
}

impl Default for DevicePreference {
    fn default() -> Self {
        Self::Auto
    }
}
