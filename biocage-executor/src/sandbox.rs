//! The sandbox: one isolated container, its exposed paths, and its session.
//!
//! A [`Sandbox`] owns at most one running container at a time. Every
//! operation takes `&mut self`, so calls against one sandbox are strictly
//! sequential; independent sandboxes run in parallel.

use std::io::Write as _;
use std::path::Path;
use std::time::{Duration, Instant};

use biocage_core::{
    AccessMode, ContainerId, ContainerName, ExecutionResult, ExposedPath, ExposedPathRegistry,
    PathKind, ResourceLimits, SandboxId, SessionSummary,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::ContainerRuntime;
use crate::ephemeral::EphemeralExecutor;
use crate::framing::SESSION_RUNNER;
use crate::policy::{assess, Assessment};
use crate::runner::SessionExecutor;
use crate::{ContainerHandle, ContainerSpec, ExecutorError, LaunchMode, RunOptions, SandboxConfig};

/// Wall-clock limit for reading the session summary.
const INSPECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Observable lifecycle state of a sandbox's container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

#[derive(Debug)]
enum Lifecycle {
    Stopped,
    /// A launch is in flight, or was cancelled part-way.
    Starting(ContainerName),
    Running(ContainerHandle),
    /// A stop is in flight, or was cancelled part-way.
    Stopping(ContainerName),
}

impl Lifecycle {
    fn state(&self) -> LifecycleState {
        match self {
            Self::Stopped => LifecycleState::Stopped,
            Self::Starting(_) => LifecycleState::Starting,
            Self::Running(_) => LifecycleState::Running,
            Self::Stopping(_) => LifecycleState::Stopping,
        }
    }

    fn container_name(&self) -> Option<&ContainerName> {
        match self {
            Self::Stopped => None,
            Self::Starting(name) | Self::Stopping(name) => Some(name),
            Self::Running(handle) => Some(&handle.name),
        }
    }
}

/// Result of exposing a host path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ExposeOutcome {
    /// Where the path is visible inside the container.
    pub container_path: String,
    /// The running container was replaced to pick up the new mount; its
    /// session state is gone.
    pub restarted: bool,
}

/// Point-in-time snapshot of a sandbox.
#[derive(Debug, Clone, Serialize)]
#[non_exhaustive]
pub struct SandboxInfo {
    pub id: SandboxId,
    pub state: LifecycleState,
    pub container_id: Option<ContainerId>,
    pub container_name: Option<ContainerName>,
    pub started_at: Option<DateTime<Utc>>,
    pub limits: Option<ResourceLimits>,
    pub image: String,
    pub exposed_paths: Vec<ExposedPath>,
    pub temporary_artifacts: usize,
}

/// Container lifecycle manager and session front door.
///
/// # Cleanup
/// [`Sandbox::cleanup`] (or [`Sandbox::close`]) stops the container and
/// deletes temporary artifacts. A sandbox dropped without cleanup still
/// deletes its artifacts and asks the runtime to abandon its container.
pub struct Sandbox<R: ContainerRuntime> {
    id: SandboxId,
    runtime: R,
    config: SandboxConfig,
    registry: ExposedPathRegistry,
    lifecycle: Lifecycle,
    temp_artifacts: Vec<tempfile::TempPath>,
    image_ready: bool,
}

impl<R: ContainerRuntime> Sandbox<R> {
    /// Create a stopped sandbox. Nothing is launched until `start`.
    #[must_use]
    pub fn new(runtime: R, config: SandboxConfig) -> Self {
        Self {
            id: SandboxId::new(),
            runtime,
            config,
            registry: ExposedPathRegistry::new(),
            lifecycle: Lifecycle::Stopped,
            temp_artifacts: Vec::new(),
            image_ready: false,
        }
    }

    /// Create a sandbox, apply the configured exposures, and start it.
    ///
    /// Pair with [`Sandbox::close`].
    ///
    /// # Errors
    /// Returns [`ExecutorError::Config`] if a configured path cannot be
    /// exposed, or any error from [`Sandbox::start`].
    pub async fn open(runtime: R, config: SandboxConfig) -> Result<Self, ExecutorError> {
        let mut sandbox = Self::new(runtime, config);
        sandbox.apply_configured_exposures()?;
        sandbox.start_configured().await?;
        Ok(sandbox)
    }

    /// Run [`Sandbox::cleanup`] and consume the sandbox.
    pub async fn close(mut self) {
        self.cleanup().await;
    }

    fn apply_configured_exposures(&mut self) -> Result<(), ExecutorError> {
        let files = self
            .config
            .expose_files
            .iter()
            .map(|(h, c)| (h, c, AccessMode::ReadOnly, PathKind::File));
        let dirs = self
            .config
            .expose_directories
            .iter()
            .map(|(h, c)| (h, c, AccessMode::ReadOnly, PathKind::Directory));
        let rw_dirs = self
            .config
            .expose_directories_rw
            .iter()
            .map(|(h, c)| (h, c, AccessMode::ReadWrite, PathKind::Directory));

        for (host, container, mode, kind) in files.chain(dirs).chain(rw_dirs) {
            self.registry.insert(host, Some(container.as_str()), mode, kind)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> SandboxId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    /// The running container, if any.
    #[must_use]
    pub fn container(&self) -> Option<&ContainerHandle> {
        match &self.lifecycle {
            Lifecycle::Running(handle) => Some(handle),
            _ => None,
        }
    }

    #[must_use]
    pub fn exposed_paths(&self) -> &ExposedPathRegistry {
        &self.registry
    }

    #[must_use]
    pub fn info(&self) -> SandboxInfo {
        let handle = self.container();
        SandboxInfo {
            id: self.id,
            state: self.state(),
            container_id: handle.map(|h| h.id.clone()),
            container_name: self.lifecycle.container_name().cloned(),
            started_at: handle.map(|h| h.started_at),
            limits: handle.map(|h| h.limits),
            image: self.config.image.clone(),
            exposed_paths: self.registry.iter().cloned().collect(),
            temporary_artifacts: self.temp_artifacts.len(),
        }
    }

    /// Make sure the execution image is present: build it from the
    /// configured context, or pull it. Runs at most once per sandbox.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ImageUnavailable`] if it cannot be obtained.
    pub async fn ensure_image(&mut self) -> Result<(), ExecutorError> {
        if self.image_ready {
            return Ok(());
        }
        let image = self.config.image.as_str();
        if !self.runtime.image_exists(image).await? {
            match &self.config.build_context {
                Some(context) => self.runtime.build_image(image, context).await?,
                None => self.runtime.pull_image(image).await?,
            }
        }
        self.image_ready = true;
        Ok(())
    }

    /// Launch a container with the current exposed paths and `limits`.
    ///
    /// # Errors
    /// - [`ExecutorError::AlreadyRunning`] if a container is running
    /// - [`ExecutorError::ImageUnavailable`] if the image cannot be obtained
    /// - [`ExecutorError::LaunchFailed`] if the runtime rejects the launch
    pub async fn start(&mut self, limits: ResourceLimits) -> Result<ContainerId, ExecutorError> {
        match self.state() {
            LifecycleState::Stopped => {}
            LifecycleState::Running => return Err(ExecutorError::AlreadyRunning),
            LifecycleState::Starting | LifecycleState::Stopping => {
                tracing::warn!(
                    sandbox = %self.id,
                    "previous lifecycle transition was interrupted; cleaning up"
                );
                self.stop().await;
            }
        }

        self.ensure_image().await?;

        let name = ContainerName::generate(&self.config.container_name_prefix);
        let spec = ContainerSpec::new(
            name.clone(),
            self.config.image.clone(),
            limits,
            self.registry.iter().cloned().collect(),
            LaunchMode::Idle,
        );

        self.lifecycle = Lifecycle::Starting(name.clone());
        tracing::info!(
            sandbox = %self.id,
            container = %name,
            memory = %limits.memory,
            cpus = %limits.cpus,
            network = limits.network_access,
            mounts = spec.mounts.len(),
            "starting container"
        );

        match self.runtime.launch(&spec).await {
            Ok(id) => {
                tracing::info!(
                    sandbox = %self.id,
                    container = %name,
                    container_id = %id.short(),
                    "container running"
                );
                self.lifecycle = Lifecycle::Running(ContainerHandle::new(id.clone(), name, limits));
                Ok(id)
            }
            Err(e) => {
                if let Err(remove_err) = self.runtime.remove(&name).await {
                    tracing::debug!(
                        container = %name,
                        "no container to remove after failed launch: {remove_err}"
                    );
                }
                self.lifecycle = Lifecycle::Stopped;
                Err(e)
            }
        }
    }

    /// Start with the limits from the saved configuration.
    ///
    /// # Errors
    /// Same as [`Sandbox::start`].
    pub async fn start_configured(&mut self) -> Result<ContainerId, ExecutorError> {
        let limits = self.config.limits;
        self.start(limits).await
    }

    /// Stop and remove the container. A no-op when already stopped;
    /// runtime failures are logged, never returned.
    pub async fn stop(&mut self) {
        let name = match std::mem::replace(&mut self.lifecycle, Lifecycle::Stopped) {
            Lifecycle::Stopped => return,
            Lifecycle::Starting(name) | Lifecycle::Stopping(name) => name,
            Lifecycle::Running(handle) => handle.name,
        };
        self.lifecycle = Lifecycle::Stopping(name.clone());
        tracing::info!(sandbox = %self.id, container = %name, "stopping container");

        if let Err(e) = self.runtime.stop(&name).await {
            tracing::warn!(container = %name, "container stop failed: {e}");
        }
        if let Err(e) = self.runtime.remove(&name).await {
            tracing::warn!(container = %name, "container remove failed: {e}");
        }

        self.lifecycle = Lifecycle::Stopped;
        tracing::info!(sandbox = %self.id, container = %name, "container stopped");
    }

    /// Stop, then start a fresh container. `None` reuses the running
    /// container's limits, or the configured ones when stopped.
    ///
    /// # Errors
    /// Same as [`Sandbox::start`].
    pub async fn restart(
        &mut self,
        limits: Option<ResourceLimits>,
    ) -> Result<ContainerId, ExecutorError> {
        let limits = limits
            .or_else(|| self.container().map(|h| h.limits))
            .unwrap_or(self.config.limits);
        self.stop().await;
        self.start(limits).await
    }

    /// Bind a host path into the sandbox.
    ///
    /// If a container is running it is replaced (with the same limits) so
    /// the mount takes effect; the outcome reports that.
    ///
    /// # Errors
    /// - [`ExecutorError::Config`] if the path cannot be exposed
    /// - any error from restarting the container
    pub async fn expose(
        &mut self,
        host_path: &Path,
        container_path: Option<&str>,
        mode: AccessMode,
    ) -> Result<ExposeOutcome, ExecutorError> {
        self.expose_kind(host_path, container_path, mode, PathKind::Any).await
    }

    /// Expose a regular file, read-only.
    ///
    /// # Errors
    /// Same as [`Sandbox::expose`]; also fails if `host_path` is not a file.
    pub async fn expose_file(
        &mut self,
        host_path: &Path,
        container_path: Option<&str>,
    ) -> Result<ExposeOutcome, ExecutorError> {
        self.expose_kind(host_path, container_path, AccessMode::ReadOnly, PathKind::File).await
    }

    /// Expose a directory.
    ///
    /// # Errors
    /// Same as [`Sandbox::expose`]; also fails if `host_path` is not a directory.
    pub async fn expose_directory(
        &mut self,
        host_path: &Path,
        container_path: Option<&str>,
        mode: AccessMode,
    ) -> Result<ExposeOutcome, ExecutorError> {
        self.expose_kind(host_path, container_path, mode, PathKind::Directory).await
    }

    async fn expose_kind(
        &mut self,
        host_path: &Path,
        container_path: Option<&str>,
        mode: AccessMode,
        kind: PathKind,
    ) -> Result<ExposeOutcome, ExecutorError> {
        let binding = self.registry.insert(host_path, container_path, mode, kind)?;
        tracing::info!(
            sandbox = %self.id,
            host = %binding.host_path.display(),
            container_path = %binding.container_path,
            %mode,
            "path exposed"
        );

        let restarted = match self.container().map(|h| h.limits) {
            Some(limits) => {
                tracing::info!(
                    sandbox = %self.id,
                    "restarting container to apply new mount; session state is lost"
                );
                self.stop().await;
                self.start(limits).await?;
                true
            }
            None => false,
        };

        Ok(ExposeOutcome { container_path: binding.container_path, restarted })
    }

    /// Write `content` to a new host temporary file and expose it read-only.
    ///
    /// The file is deleted on [`Sandbox::cleanup`] or when the sandbox is dropped.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Io`] if the file cannot be written, or any
    /// error from [`Sandbox::expose_file`].
    pub async fn create_temporary_artifact(
        &mut self,
        content: &str,
        suffix: &str,
    ) -> Result<ExposeOutcome, ExecutorError> {
        let mut file = tempfile::Builder::new().prefix("biocage-").suffix(suffix).tempfile()?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        let path = file.into_temp_path();

        let outcome = self
            .expose_kind(&path, None, AccessMode::ReadOnly, PathKind::File)
            .await?;
        self.temp_artifacts.push(path);
        Ok(outcome)
    }

    /// Stop the container, delete temporary artifacts, and forget every
    /// exposed path. Best-effort; never fails.
    pub async fn cleanup(&mut self) {
        self.stop().await;
        for artifact in self.temp_artifacts.drain(..) {
            let path = artifact.to_path_buf();
            if let Err(e) = artifact.close() {
                tracing::debug!(path = %path.display(), "temporary artifact already gone: {e}");
            }
        }
        self.registry.clear();
        tracing::info!(sandbox = %self.id, "sandbox cleaned up");
    }

    /// Execute `code`: in the persistent session when a container is
    /// running, otherwise in a one-shot container. Then apply the failure
    /// policy. Never fails; problems are reported in the result.
    pub async fn run(&mut self, code: &str, opts: RunOptions) -> ExecutionResult {
        self.run_assessed(code, opts).await.0
    }

    /// [`Sandbox::run`], also returning the failure policy's verdict.
    pub async fn run_assessed(
        &mut self,
        code: &str,
        opts: RunOptions,
    ) -> (ExecutionResult, Assessment) {
        self.run_with_stdin(code, "", opts).await
    }

    /// [`Sandbox::run_assessed`] with `stdin` readable by the code.
    pub async fn run_with_stdin(
        &mut self,
        code: &str,
        stdin: &str,
        opts: RunOptions,
    ) -> (ExecutionResult, Assessment) {
        let started = Instant::now();
        let outcome = if self.is_running() {
            self.execute_in_session(code, stdin, opts.timeout).await
        } else {
            self.ephemeral(code, stdin, opts.timeout).await
        };
        let result = outcome.unwrap_or_else(|e| {
            ExecutionResult::infrastructure(format!("execution failed: {e}"), started.elapsed())
        });
        let verdict = self.apply_policy(&result, opts).await;
        (result, verdict)
    }

    /// Execute `code` in the persistent session and apply the failure policy.
    ///
    /// # Errors
    /// Returns [`ExecutorError::NotRunning`] if no container is running.
    pub async fn execute(
        &mut self,
        code: &str,
        opts: RunOptions,
    ) -> Result<ExecutionResult, ExecutorError> {
        if !self.is_running() {
            return Err(ExecutorError::NotRunning);
        }
        Ok(self.run(code, opts).await)
    }

    async fn execute_in_session(
        &self,
        code: &str,
        stdin: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        let Some(handle) = self.container() else {
            return Err(ExecutorError::NotRunning);
        };
        SessionExecutor::new(&self.runtime, &handle.name)
            .execute_with_stdin(code, stdin, timeout)
            .await
    }

    /// Execute `code` in a fresh one-shot container, with no session.
    ///
    /// # Errors
    /// Returns an error if the image cannot be obtained or the runtime
    /// client cannot be run.
    pub async fn run_ephemeral(
        &mut self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.ephemeral(code, "", timeout).await
    }

    async fn ephemeral(
        &mut self,
        code: &str,
        stdin: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.ensure_image().await?;
        EphemeralExecutor::new(
            &self.runtime,
            &self.config.image,
            &self.config.container_name_prefix,
            self.config.limits,
            self.registry.iter().cloned().collect(),
        )
        .execute_with_stdin(code, stdin, timeout)
        .await
    }

    async fn apply_policy(&mut self, result: &ExecutionResult, opts: RunOptions) -> Assessment {
        let verdict = assess(result, opts.failure_policy);
        if let Some(category) = verdict.category {
            tracing::info!(
                sandbox = %self.id,
                %category,
                exit_code = result.exit_code(),
                "user code failed"
            );
        }
        if verdict.teardown && self.lifecycle.container_name().is_some() {
            tracing::warn!(
                sandbox = %self.id,
                class = %verdict.class,
                error = result.error().unwrap_or_default(),
                "execution failed; tearing down container"
            );
            self.stop().await;
        }
        verdict
    }

    /// Read the saved session state's imports, functions and variable names.
    ///
    /// # Errors
    /// - [`ExecutorError::NotRunning`] if no container is running
    /// - [`ExecutorError::CommandFailed`] if the summary cannot be read
    pub async fn inspect_session(&self) -> Result<SessionSummary, ExecutorError> {
        let Some(handle) = self.container() else {
            return Err(ExecutorError::NotRunning);
        };
        let command = ["python3", "-c", SESSION_RUNNER, "--inspect"];
        let failed = |reason: String| ExecutorError::CommandFailed {
            command: "inspect session".to_owned(),
            reason,
        };

        let exec = self.runtime.exec(&handle.name, &command, Vec::new());
        let output = tokio::time::timeout(INSPECT_TIMEOUT, exec)
            .await
            .map_err(|_| failed(format!("timed out after {}s", INSPECT_TIMEOUT.as_secs())))??;

        let line = output
            .stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                failed(format!("no summary printed; stderr: {}", output.stderr.trim()))
            })?;
        serde_json::from_str(line).map_err(|e| failed(format!("malformed summary: {e}")))
    }
}

impl<R: ContainerRuntime> Drop for Sandbox<R> {
    fn drop(&mut self) {
        if let Some(name) = self.lifecycle.container_name() {
            self.runtime.abandon(name);
        }
    }
}
