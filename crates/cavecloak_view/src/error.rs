//! # View Error Types
//!
//! Errors surfaced while configuring the pipeline or talking to the host.

use cavecloak_index::IndexError;
use thiserror::Error;

/// Errors that can occur while setting up the view pipeline.
#[derive(Error, Debug)]
pub enum ViewError {
    /// Reading the configuration file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`crate::ViewConfig`].
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A configuration value is outside of anything usable.
    #[error("invalid config value for {key}: {reason}")]
    InvalidConfig {
        /// Config key.
        key: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// The tracking store failed.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

/// Failure of a single client-facing call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitError {
    /// The host does not implement this call at all.
    #[error("operation not supported by host")]
    Unsupported,

    /// The host implements the call but refused this invocation.
    #[error("host rejected the operation")]
    Rejected,
}
