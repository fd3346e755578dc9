//! Container runtime abstraction trait.
//!
//! Allows swapping Docker for another runtime (or a scripted fake in tests)
//! without changing the lifecycle and session logic.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use biocage_core::{ContainerId, ContainerName};

use crate::{ContainerSpec, ExecutorError};

/// Raw output of one runtime process (an exec or a one-shot run).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    #[must_use]
    pub fn new(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self { stdout: stdout.into(), stderr: stderr.into(), exit_code }
    }
}

/// Container runtime abstraction.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
///
/// # Cancel Safety
/// `exec` and `run_once` must be cancel safe: dropping the future kills the
/// runtime client process. Timeouts are enforced by dropping these futures.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Report whether `image` is present locally.
    ///
    /// # Errors
    /// Returns [`ExecutorError::RuntimeUnavailable`] if the runtime cannot be queried.
    async fn image_exists(&self, image: &str) -> Result<bool, ExecutorError>;

    /// Build `image` from a build context directory.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ImageUnavailable`] if the build fails.
    async fn build_image(&self, image: &str, context: &Path) -> Result<(), ExecutorError>;

    /// Pull `image` from its registry.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ImageUnavailable`] if the pull fails.
    async fn pull_image(&self, image: &str) -> Result<(), ExecutorError>;

    /// Launch a detached, idle container described by `spec`.
    ///
    /// # Errors
    /// Returns [`ExecutorError::LaunchFailed`] if the runtime rejects the launch.
    async fn launch(&self, spec: &ContainerSpec) -> Result<ContainerId, ExecutorError>;

    /// Run `command` inside a running container with `stdin` attached.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Io`] if the runtime client cannot be spawned.
    async fn exec(
        &self,
        container: &ContainerName,
        command: &[&str],
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError>;

    /// Run a one-shot, auto-removed container with `stdin` attached.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Io`] if the runtime client cannot be spawned.
    async fn run_once(
        &self,
        spec: &ContainerSpec,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError>;

    /// Stop a running container.
    ///
    /// # Errors
    /// Returns [`ExecutorError::CommandFailed`] if the stop command fails.
    async fn stop(&self, container: &ContainerName) -> Result<(), ExecutorError>;

    /// Remove a (stopped) container.
    ///
    /// # Errors
    /// Returns [`ExecutorError::CommandFailed`] if the remove command fails.
    async fn remove(&self, container: &ContainerName) -> Result<(), ExecutorError>;

    /// Kill processes inside `container` whose command line contains `pattern`.
    ///
    /// # Errors
    /// Returns [`ExecutorError::CommandFailed`] if the signal could not be delivered.
    async fn kill_matching(
        &self,
        container: &ContainerName,
        pattern: &str,
    ) -> Result<(), ExecutorError>;

    /// Check if the runtime is available and properly configured.
    ///
    /// # Errors
    /// Returns [`ExecutorError::BinaryNotFound`] or [`ExecutorError::RuntimeUnavailable`]
    /// if the environment is not ready.
    async fn health_check(&self) -> Result<(), ExecutorError>;

    /// Fire-and-forget forced removal, used where no async context exists
    /// (dropping a sandbox that still owns a container).
    fn abandon(&self, container: &ContainerName) {
        let _ = container;
    }
}

#[async_trait]
impl<T: ContainerRuntime + ?Sized> ContainerRuntime for Arc<T> {
    async fn image_exists(&self, image: &str) -> Result<bool, ExecutorError> {
        (**self).image_exists(image).await
    }

    async fn build_image(&self, image: &str, context: &Path) -> Result<(), ExecutorError> {
        (**self).build_image(image, context).await
    }

    async fn pull_image(&self, image: &str) -> Result<(), ExecutorError> {
        (**self).pull_image(image).await
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<ContainerId, ExecutorError> {
        (**self).launch(spec).await
    }

    async fn exec(
        &self,
        container: &ContainerName,
        command: &[&str],
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        (**self).exec(container, command, stdin).await
    }

    async fn run_once(
        &self,
        spec: &ContainerSpec,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        (**self).run_once(spec, stdin).await
    }

    async fn stop(&self, container: &ContainerName) -> Result<(), ExecutorError> {
        (**self).stop(container).await
    }

    async fn remove(&self, container: &ContainerName) -> Result<(), ExecutorError> {
        (**self).remove(container).await
    }

    async fn kill_matching(
        &self,
        container: &ContainerName,
        pattern: &str,
    ) -> Result<(), ExecutorError> {
        (**self).kill_matching(container, pattern).await
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        (**self).health_check().await
    }

    fn abandon(&self, container: &ContainerName) {
        (**self).abandon(container);
    }
}
