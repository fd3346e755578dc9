use std::path::PathBuf;

/// Configuration errors produced by the `biocage-core` crate.
///
/// These are surfaced to the caller immediately and never retried.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A host path handed to the registry does not exist.
    #[error("host path does not exist: {path}")]
    HostPathNotFound { path: PathBuf },

    /// A host path exists but is not the kind of entry the caller asked for.
    #[error("host path {path} is not a {expected}")]
    UnexpectedPathKind { path: PathBuf, expected: &'static str },

    /// A host or container path cannot be expressed as a bind mount.
    #[error("invalid mount path '{path}': {reason}")]
    InvalidMountPath { path: String, reason: String },

    /// A memory limit string could not be parsed or is out of range.
    #[error("invalid memory limit '{value}': {reason}")]
    InvalidMemoryLimit { value: String, reason: String },

    /// A CPU limit was not a finite positive number.
    #[error("invalid cpu limit {value}: must be a finite number greater than zero")]
    InvalidCpuLimit { value: f64 },

    /// Resolving a host path failed for a reason other than absence.
    #[error("failed to resolve host path {path}: {source}")]
    Resolve {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
