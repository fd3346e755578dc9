//! Docker container runtime implementation.
//!
//! Lifecycle and stdio-carrying operations go through the `docker` CLI;
//! daemon health and image inspection use the Engine API over the daemon's
//! Unix socket, falling back to the CLI when the socket is unreachable.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use biocage_core::{ContainerId, ContainerName};
use hyper::{Method, StatusCode};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::backend::{ContainerRuntime, ProcessOutput};
use crate::unix_client::{encode_image_ref, engine_request};
use crate::{ContainerSpec, ExecutorError, LaunchMode};

/// Label attached to every container this crate launches.
pub const MANAGED_LABEL: &str = "biocage.managed=true";

const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Kills every process whose command line contains `$1`, except itself.
const KILL_MATCHING_SHELL: &str = r#"for p in /proc/[0-9]*; do
    pid=${p#/proc/}
    [ "$pid" = "$$" ] && continue
    cmd=$(tr '\0' ' ' < "$p/cmdline" 2>/dev/null) || continue
    case "$cmd" in
        *"$1"*) kill -9 "$pid" 2>/dev/null || true ;;
    esac
done"#;

/// Docker runtime backend.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    /// Path to the `docker` binary.
    binary_path: PathBuf,

    /// Docker daemon Unix socket.
    socket_path: PathBuf,
}

impl DockerBackend {
    /// Create a new backend with the given paths.
    #[must_use]
    pub fn new(binary_path: PathBuf, socket_path: PathBuf) -> Self {
        Self { binary_path, socket_path }
    }

    /// Create a backend using system defaults.
    ///
    /// Looks for `docker` in `$PATH` and takes the socket from a
    /// `unix://` `DOCKER_HOST`, else `/var/run/docker.sock`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let socket = std::env::var("DOCKER_HOST")
            .ok()
            .and_then(|host| host.strip_prefix("unix://").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET));
        Self::new(PathBuf::from("docker"), socket)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ExecutorError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ExecutorError::BinaryNotFound { path: self.binary_path.clone() }
        } else {
            ExecutorError::Io(e)
        }
    }

    /// Run a docker subcommand to completion with no stdin.
    async fn run_cli(&self, args: &[&str]) -> Result<ProcessOutput, ExecutorError> {
        let output = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;
        Ok(ProcessOutput::new(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            output.status.code(),
        ))
    }

    /// Run a docker subcommand and require it to exit zero.
    async fn run_checked(&self, args: &[&str]) -> Result<ProcessOutput, ExecutorError> {
        let output = self.run_cli(args).await?;
        if output.exit_code == Some(0) {
            return Ok(output);
        }
        Err(ExecutorError::CommandFailed {
            command: format!("docker {}", args.join(" ")),
            reason: failure_reason(&output),
        })
    }

    /// Spawn a docker subcommand with piped stdio, feed it `stdin`, and
    /// collect its output. Dropping the returned future kills the client.
    async fn run_with_stdin(
        &self,
        args: Vec<String>,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        let mut child = self
            .command()
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        if let Some(mut pipe) = child.stdin.take() {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&stdin).await {
                    tracing::debug!("stdin write to docker client failed: {e}");
                }
                let _ = pipe.shutdown().await;
            });
        }

        let output = child.wait_with_output().await?;
        tracing::debug!(
            stdout_len = output.stdout.len(),
            stderr_len = output.stderr.len(),
            exit_code = ?output.status.code(),
            "docker client finished"
        );
        Ok(ProcessOutput::new(
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
            output.status.code(),
        ))
    }
}

#[async_trait]
impl ContainerRuntime for DockerBackend {
    async fn image_exists(&self, image: &str) -> Result<bool, ExecutorError> {
        let path = format!("/images/{}/json", encode_image_ref(image));
        match engine_request(&self.socket_path, Method::GET, &path).await {
            Ok((StatusCode::OK, _)) => return Ok(true),
            Ok((StatusCode::NOT_FOUND, _)) => return Ok(false),
            Ok((status, body)) => {
                tracing::debug!(%status, %body, "unexpected image inspect status, asking the CLI");
            }
            Err(e) => tracing::debug!("engine API unreachable, asking the CLI: {e}"),
        }

        let output = self.run_cli(&["images", "-q", image]).await?;
        if output.exit_code != Some(0) {
            return Err(ExecutorError::RuntimeUnavailable { reason: failure_reason(&output) });
        }
        Ok(!output.stdout.trim().is_empty())
    }

    async fn build_image(&self, image: &str, context: &Path) -> Result<(), ExecutorError> {
        tracing::info!(image, context = %context.display(), "building image");
        let context = context.to_string_lossy();
        self.run_checked(&["build", "-t", image, &context])
            .await
            .map_err(image_unavailable(image))?;
        tracing::info!(image, "image built");
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), ExecutorError> {
        tracing::info!(image, "pulling image");
        self.run_checked(&["pull", image])
            .await
            .map_err(image_unavailable(image))?;
        Ok(())
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<ContainerId, ExecutorError> {
        let args = run_args(spec);
        tracing::info!(container = %spec.name, image = %spec.image, "launching container");

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.run_cli(&arg_refs).await?;
        if output.exit_code != Some(0) {
            return Err(ExecutorError::LaunchFailed(failure_reason(&output)));
        }

        let id = output.stdout.trim();
        if id.is_empty() {
            return Err(ExecutorError::LaunchFailed(
                "docker run printed no container id".to_owned(),
            ));
        }
        Ok(ContainerId::new(id))
    }

    async fn exec(
        &self,
        container: &ContainerName,
        command: &[&str],
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        let mut args = vec!["exec".to_owned(), "-i".to_owned(), container.as_str().to_owned()];
        args.extend(command.iter().map(|s| (*s).to_owned()));
        tracing::debug!(container = %container, stdin_len = stdin.len(), "docker exec");
        self.run_with_stdin(args, stdin).await
    }

    async fn run_once(
        &self,
        spec: &ContainerSpec,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        tracing::debug!(container = %spec.name, stdin_len = stdin.len(), "docker run (one-shot)");
        self.run_with_stdin(run_args(spec), stdin).await
    }

    async fn stop(&self, container: &ContainerName) -> Result<(), ExecutorError> {
        self.run_checked(&["stop", container.as_str()]).await?;
        Ok(())
    }

    async fn remove(&self, container: &ContainerName) -> Result<(), ExecutorError> {
        self.run_checked(&["rm", "-f", container.as_str()]).await?;
        Ok(())
    }

    async fn kill_matching(
        &self,
        container: &ContainerName,
        pattern: &str,
    ) -> Result<(), ExecutorError> {
        let name = container.as_str();
        self.run_checked(&["exec", name, "sh", "-c", KILL_MATCHING_SHELL, "sh", pattern])
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        which_binary(&self.binary_path)?;

        match engine_request(&self.socket_path, Method::GET, "/_ping").await {
            Ok((StatusCode::OK, _)) => return Ok(()),
            Ok((status, _)) => tracing::debug!(%status, "daemon ping not OK, asking the CLI"),
            Err(e) => tracing::debug!("engine API unreachable, asking the CLI: {e}"),
        }

        let output = self.run_cli(&["version", "--format", "{{.Server.Version}}"]).await?;
        if output.exit_code == Some(0) {
            Ok(())
        } else {
            Err(ExecutorError::RuntimeUnavailable { reason: failure_reason(&output) })
        }
    }

    fn abandon(&self, container: &ContainerName) {
        tracing::warn!(container = %container, "abandoning container; forcing removal");
        let args = ["rm", "-f", container.as_str()];
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let mut cmd = self.command();
            cmd.args(args).stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
            cmd.kill_on_drop(false);
            runtime.spawn(async move {
                let _ = cmd.status().await;
            });
        } else {
            let _ = std::process::Command::new(&self.binary_path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn();
        }
    }
}

/// Build the `docker run` argument list for a container spec.
///
/// Every container is hardened the same way: no privilege escalation, a
/// read-only root filesystem whose only writable places are size-capped
/// tmpfs scratch mounts, and no network unless the limits allow it.
#[must_use]
pub fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec!["run".to_owned()];
    match spec.mode {
        LaunchMode::Idle => args.push("-d".to_owned()),
        LaunchMode::Once { .. } => {
            args.push("--rm".to_owned());
            args.push("-i".to_owned());
        }
    }

    args.push("--name".to_owned());
    args.push(spec.name.as_str().to_owned());
    args.push("--init".to_owned());
    args.push(format!("--memory={}", spec.limits.memory));
    args.push(format!("--cpus={}", spec.limits.cpus));
    args.push("--security-opt=no-new-privileges:true".to_owned());
    args.push("--read-only".to_owned());

    for scratch in &spec.scratch {
        args.push(format!("--tmpfs={}:{}", scratch.target, scratch.options));
    }

    if !spec.limits.network_access {
        args.push("--network=none".to_owned());
    }

    for mount in &spec.mounts {
        args.push("-v".to_owned());
        args.push(format!(
            "{}:{}:{}",
            mount.host_path.display(),
            mount.container_path,
            mount.mode.mount_option()
        ));
    }

    args.push("--label".to_owned());
    args.push(MANAGED_LABEL.to_owned());
    args.push(spec.image.clone());

    match &spec.mode {
        LaunchMode::Idle => {
            args.push("sleep".to_owned());
            args.push("infinity".to_owned());
        }
        LaunchMode::Once { command } => args.extend(command.iter().cloned()),
    }
    args
}

fn image_unavailable(image: &str) -> impl FnOnce(ExecutorError) -> ExecutorError + '_ {
    move |e| ExecutorError::ImageUnavailable { image: image.to_owned(), reason: e.to_string() }
}

fn failure_reason(output: &ProcessOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        match output.exit_code {
            Some(code) => format!("exited with status {code}"),
            None => "terminated by signal".to_owned(),
        }
    } else {
        stderr.to_owned()
    }
}

/// Verify a binary exists either at the given path or in PATH.
fn which_binary(path: &Path) -> Result<(), ExecutorError> {
    if path.is_absolute() {
        if path.exists() {
            return Ok(());
        }
        return Err(ExecutorError::BinaryNotFound { path: path.to_owned() });
    }

    let found = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(path).exists()))
        .unwrap_or(false);

    if found {
        Ok(())
    } else {
        Err(ExecutorError::BinaryNotFound { path: path.to_owned() })
    }
}
