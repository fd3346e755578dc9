//! Exposed-path registry: host path → container path bindings.
//!
//! Pure bookkeeping. Nothing here touches a container; the lifecycle
//! manager reads the registry when it assembles the mount list for a launch.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Directory under which host paths are mounted when no container path is given.
pub const SHARED_MOUNT_PREFIX: &str = "/app/shared";

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AccessMode {
    /// The sandbox can read but not modify the host path.
    #[default]
    ReadOnly,
    /// Writes from inside the sandbox land on the host.
    ReadWrite,
}

impl AccessMode {
    /// The mount option suffix used by bind-mount specs (`ro` / `rw`).
    #[must_use]
    pub fn mount_option(self) -> &'static str {
        match self {
            Self::ReadOnly => "ro",
            Self::ReadWrite => "rw",
        }
    }

    #[must_use]
    pub fn from_read_only(read_only: bool) -> Self {
        if read_only {
            Self::ReadOnly
        } else {
            Self::ReadWrite
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mount_option())
    }
}

/// One host path bound into the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExposedPath {
    /// Absolute, symlink-resolved host path.
    pub host_path: PathBuf,
    /// Absolute path inside the container.
    pub container_path: String,
    pub mode: AccessMode,
}

/// What kind of host entry an exposure expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathKind {
    Any,
    File,
    Directory,
}

/// Registry of exposed paths, keyed by resolved host path.
///
/// Each host path maps to exactly one binding; exposing it again replaces
/// the earlier binding. Container paths are not required to be unique.
#[derive(Debug, Clone, Default)]
pub struct ExposedPathRegistry {
    entries: BTreeMap<PathBuf, ExposedPath>,
}

impl ExposedPathRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `host_path` and record a binding for it.
    ///
    /// When `container_path` is `None` the binding lands at
    /// `/app/shared/<basename>`.
    ///
    /// # Errors
    /// - [`CoreError::HostPathNotFound`] if the host path does not exist
    /// - [`CoreError::UnexpectedPathKind`] if it is not the requested `kind`
    /// - [`CoreError::InvalidMountPath`] if either side cannot be bind-mounted
    pub fn insert(
        &mut self,
        host_path: &Path,
        container_path: Option<&str>,
        mode: AccessMode,
        kind: PathKind,
    ) -> Result<ExposedPath, CoreError> {
        let resolved = resolve_host_path(host_path)?;
        check_kind(&resolved, kind)?;

        let host_str = resolved.to_string_lossy();
        if host_str.contains(':') {
            return Err(CoreError::InvalidMountPath {
                path: host_str.into_owned(),
                reason: "host path must not contain ':'".to_owned(),
            });
        }

        let container_path = match container_path {
            Some(path) => {
                validate_container_path(path)?;
                path.to_owned()
            }
            None => default_container_path(&resolved)?,
        };

        let binding = ExposedPath { host_path: resolved.clone(), container_path, mode };
        self.entries.insert(resolved, binding.clone());
        Ok(binding)
    }

    /// Look up the binding for a host path (resolved the same way as `insert`).
    #[must_use]
    pub fn get(&self, host_path: &Path) -> Option<&ExposedPath> {
        let resolved = std::fs::canonicalize(host_path).ok()?;
        self.entries.get(&resolved)
    }

    /// Iterate bindings in host-path order.
    pub fn iter(&self) -> impl Iterator<Item = &ExposedPath> {
        self.entries.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every binding.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

fn resolve_host_path(host_path: &Path) -> Result<PathBuf, CoreError> {
    std::fs::canonicalize(host_path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            CoreError::HostPathNotFound { path: host_path.to_owned() }
        } else {
            CoreError::Resolve { path: host_path.to_owned(), source }
        }
    })
}

fn check_kind(path: &Path, kind: PathKind) -> Result<(), CoreError> {
    let ok = match kind {
        PathKind::Any => true,
        PathKind::File => path.is_file(),
        PathKind::Directory => path.is_dir(),
    };
    if ok {
        return Ok(());
    }
    let expected = if kind == PathKind::File { "file" } else { "directory" };
    Err(CoreError::UnexpectedPathKind { path: path.to_owned(), expected })
}

fn validate_container_path(path: &str) -> Result<(), CoreError> {
    let reason = if !path.starts_with('/') {
        "container path must be absolute"
    } else if path.contains(':') {
        "container path must not contain ':'"
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidMountPath { path: path.to_owned(), reason: reason.to_owned() })
}

fn default_container_path(resolved: &Path) -> Result<String, CoreError> {
    let name = resolved.file_name().ok_or_else(|| CoreError::InvalidMountPath {
        path: resolved.to_string_lossy().into_owned(),
        reason: "host path has no base name to derive a container path from".to_owned(),
    })?;
    let path = format!("{SHARED_MOUNT_PREFIX}/{}", name.to_string_lossy());
    validate_container_path(&path)?;
    Ok(path)
}
