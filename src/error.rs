//! Error types for trainkit

use thiserror::Error;

/// Main error type for trainer operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (shape mismatch between model, optimizer and scheduler groups)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A keyed collection references a key its counterpart does not have
    #[error("No such key `{key}` in {collection}")]
    MissingKey {
        /// The missing key
        key: String,
        /// Which collection was searched
        collection: &'static str,
    },

    /// Configuration the chosen iteration strategy cannot handle
    #[error("Unsupported configuration: {0}")]
    Unsupported(String),

    /// Batch does not have the layout the iteration strategy expects
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// Training loop was interrupted
    #[error("Training interrupted")]
    Interrupted,

    /// Tensor operation error
    #[error("Tensor operation error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Signal handler could not be installed
    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// Other errors, typically raised by user callbacks
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for trainer operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a missing key error
    pub fn missing_key(key: impl Into<String>, collection: &'static str) -> Self {
        Self::MissingKey {
            key: key.into(),
            collection,
        }
    }

    /// Create an unsupported configuration error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an invalid batch error
    pub fn invalid_batch(msg: impl Into<String>) -> Self {
        Self::InvalidBatch(msg.into())
    }

    /// Whether this error is a configuration problem detected at construction
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::MissingKey { .. } | Self::Unsupported(_)
        )
    }
}
