//! Sandbox configuration and container launch specifications.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use biocage_core::{ContainerName, ExposedPath, ResourceLimits};
use serde::{Deserialize, Serialize};

use crate::policy::FailurePolicy;

/// Writable scratch directory inside the container; holds the session state.
pub const WORKSPACE_DIR: &str = "/app/workspace";

/// Where the bootstrap shell writes the session runner.
pub const RUNNER_PATH: &str = "/app/workspace/session_exec.py";

/// Where the runner persists session state between calls.
pub const STATE_PATH: &str = "/app/workspace/session_state.pkl";

/// Default execution image.
pub const DEFAULT_IMAGE: &str = "python:3.12-slim";

/// Default container name prefix.
pub const DEFAULT_NAME_PREFIX: &str = "biocage";

/// Default per-call wall-clock timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration bundle a sandbox is created with and started from.
///
/// The exposure maps are applied (in files → read-only directories →
/// read-write directories order) when the sandbox is opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct SandboxConfig {
    /// Image reference used for every container launch.
    pub image: String,

    /// Prefix for generated container names.
    pub container_name_prefix: String,

    /// Limits applied by `start_configured`.
    pub limits: ResourceLimits,

    /// Directory to `docker build` the image from when it is missing.
    /// When unset a missing image is pulled instead.
    pub build_context: Option<PathBuf>,

    /// Host file → container path, read-only.
    pub expose_files: BTreeMap<PathBuf, String>,

    /// Host directory → container path, read-only.
    pub expose_directories: BTreeMap<PathBuf, String>,

    /// Host directory → container path, read-write.
    pub expose_directories_rw: BTreeMap<PathBuf, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_owned(),
            container_name_prefix: DEFAULT_NAME_PREFIX.to_owned(),
            limits: ResourceLimits::default(),
            build_context: None,
            expose_files: BTreeMap::new(),
            expose_directories: BTreeMap::new(),
            expose_directories_rw: BTreeMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Default configuration for the given image.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self { image: image.into(), ..Self::default() }
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub fn expose_file(mut self, host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        self.expose_files.insert(host.into(), container.into());
        self
    }

    #[must_use]
    pub fn expose_directory(
        mut self,
        host: impl Into<PathBuf>,
        container: impl Into<String>,
    ) -> Self {
        self.expose_directories.insert(host.into(), container.into());
        self
    }

    #[must_use]
    pub fn expose_directory_rw(
        mut self,
        host: impl Into<PathBuf>,
        container: impl Into<String>,
    ) -> Self {
        self.expose_directories_rw.insert(host.into(), container.into());
        self
    }
}

/// Per-call execution options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct RunOptions {
    /// Wall-clock limit for the whole exec invocation.
    pub timeout: Duration,
    /// Whether a user-code failure tears the container down.
    pub failure_policy: FailurePolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { timeout: DEFAULT_TIMEOUT, failure_policy: FailurePolicy::Strict }
    }
}

impl RunOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Keep the container running after user-code errors.
    #[must_use]
    pub fn lenient(mut self) -> Self {
        self.failure_policy = FailurePolicy::Lenient;
        self
    }
}

/// A size-capped tmpfs mount; the only writable places in the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ScratchMount {
    pub target: String,
    pub options: String,
}

impl ScratchMount {
    #[must_use]
    pub fn new(target: impl Into<String>, options: impl Into<String>) -> Self {
        Self { target: target.into(), options: options.into() }
    }

    /// The two scratch areas every sandbox container gets: the session
    /// workspace and `/tmp`.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(WORKSPACE_DIR, "size=100m,mode=1777"),
            Self::new("/tmp", "noexec,nosuid,nodev,size=50m"),
        ]
    }
}

/// How the container's main process behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LaunchMode {
    /// Detached and idle, so it can be exec'd into repeatedly.
    Idle,
    /// Runs `command` once with stdin attached, then is removed.
    Once { command: Vec<String> },
}

/// Everything needed to launch one container.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ContainerSpec {
    pub name: ContainerName,
    pub image: String,
    pub limits: ResourceLimits,
    pub mounts: Vec<ExposedPath>,
    pub scratch: Vec<ScratchMount>,
    pub mode: LaunchMode,
}

impl ContainerSpec {
    /// A hardened spec with the default scratch mounts.
    #[must_use]
    pub fn new(
        name: ContainerName,
        image: impl Into<String>,
        limits: ResourceLimits,
        mounts: Vec<ExposedPath>,
        mode: LaunchMode,
    ) -> Self {
        Self {
            name,
            image: image.into(),
            limits,
            mounts,
            scratch: ScratchMount::defaults(),
            mode,
        }
    }
}
