//! Error types for the executor crate.

use std::path::PathBuf;

use biocage_core::CoreError;

/// Errors that can occur during container lifecycle operations.
///
/// Execution outcomes are never reported through this type: a call that
/// reaches the container always yields an `ExecutionResult`. These errors
/// cover configuration mistakes, lifecycle misuse, and runtime commands
/// that failed outside of an execution.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// Invalid configuration (missing host path, bad resource spec, ...).
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Container runtime binary not found at the configured path.
    #[error("container runtime binary not found at {path}")]
    BinaryNotFound { path: PathBuf },

    /// The container runtime daemon is not reachable.
    #[error("container runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    /// The execution image is absent and could not be built or pulled.
    #[error("image {image} unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },

    /// Launching a container failed.
    #[error("container launch failed: {0}")]
    LaunchFailed(String),

    /// A runtime command exited unsuccessfully.
    #[error("`{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    /// `start` was called while a container is already running.
    #[error("container is already running; stop it first")]
    AlreadyRunning,

    /// An operation that needs a running container found none.
    #[error("no running container; start the sandbox first")]
    NotRunning,

    /// Engine API request over the daemon socket failed.
    #[error("engine API request failed: {0}")]
    ApiError(String),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
