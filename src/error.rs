//! Error types for the generation service and its startup path.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A failure reported by a generation engine.
///
/// Surfaced to callers unchanged; the service never retries it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct EngineFailure {
    /// Human-readable message from the engine.
    pub message: String,
    /// Whether the engine considers the failure transient.
    #[serde(default)]
    pub retryable: bool,
}

impl EngineFailure {
    /// A failure the caller should not expect to go away on retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: false }
    }

    /// A transient failure (model warming up, upstream rate limit, network blip).
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), retryable: true }
    }
}

impl From<reqwest::Error> for EngineFailure {
    fn from(e: reqwest::Error) -> Self {
        let retryable = e.is_timeout() || e.is_connect();
        Self { message: format!("Network error: {e}"), retryable }
    }
}

/// Persisting an image to the output directory failed.
#[derive(Debug, Error)]
#[error("Failed to write {}: {source}", path.display())]
pub struct StorageError {
    /// The file or directory being written.
    pub path: PathBuf,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Errors returned by [`crate::service::GenerationService::submit`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was rejected before reaching the engine.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Admission cap reached.
    #[error("Generation queue is full ({limit} outstanding requests)")]
    Busy {
        /// Configured cap on outstanding requests.
        limit: usize,
    },

    /// No result arrived within the configured bound.
    #[error("Generation timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The engine failed.
    #[error("Engine error: {0}")]
    Engine(EngineFailure),

    /// The engine output could not be re-encoded to the output format.
    #[error("Image conversion error: {0}")]
    Codec(String),

    /// The image could not be persisted.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The service has shut down or its worker is gone.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Stable tag used in error response bodies.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Busy { .. } => "busy",
            Self::Timeout(_) => "timeout",
            Self::Engine(_) => "engine_failure",
            Self::Codec(_) => "codec_error",
            Self::Storage(_) => "storage_error",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Whether resubmitting the same request later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Busy { .. } | Self::Timeout(_) => true,
            Self::Engine(failure) => failure.retryable,
            Self::Validation(_) | Self::Codec(_) | Self::Storage(_) | Self::Unavailable(_) => {
                false
            }
        }
    }
}

impl From<EngineFailure> for ServiceError {
    fn from(failure: EngineFailure) -> Self {
        Self::Engine(failure)
    }
}

/// Errors that abort server startup.
#[derive(Debug, Error)]
pub enum StartupError {
    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No API key configured for the provider.
    #[error("No API key for {provider}. Set {env_var} or add it to config file.")]
    MissingApiKey {
        /// The provider name.
        provider: String,
        /// The environment variable name.
        env_var: String,
    },

    /// A cassette could not be loaded.
    #[error("Cassette error: {0}")]
    Cassette(String),

    /// The output directory is unusable.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
