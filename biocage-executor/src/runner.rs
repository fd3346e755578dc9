//! Persistent-session execution inside a running container.
//!
//! One call is one `exec` of the bootstrap shell with a framed request on
//! stdin (see [`crate::framing`]). The runner restores the session state,
//! runs the code, persists the merged state, and prints its record as the
//! last stdout line.

use std::time::{Duration, Instant};

use biocage_core::{ContainerName, ExecutionResult};

use crate::backend::ContainerRuntime;
use crate::framing::{bootstrap_command, session_frame};
use crate::output::parse_runner_output;
use crate::ExecutorError;

/// Substring of the session runner's command line, used to kill it on timeout.
pub const RUNNER_PROCESS_PATTERN: &str = "session_exec";

/// How long post-timeout cleanup may take before it is abandoned.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Executes code against the session state of one running container.
///
/// # Cancel Safety
/// Cancel safe. Dropping the future kills the `docker exec` client; the
/// in-container runner keeps going until the next timeout sweep or stop.
pub struct SessionExecutor<'a, R: ContainerRuntime> {
    runtime: &'a R,
    container: &'a ContainerName,
}

impl<'a, R: ContainerRuntime> SessionExecutor<'a, R> {
    #[must_use]
    pub fn new(runtime: &'a R, container: &'a ContainerName) -> Self {
        Self { runtime, container }
    }

    /// Execute `code` in the persistent session.
    ///
    /// A timeout yields a result with exit code 124; killing the runner
    /// process inside the container is best-effort and bounded by
    /// [`KILL_GRACE`].
    ///
    /// # Errors
    /// Returns an error only when the runtime client could not be run at
    /// all. Everything the code or the runner does is reported in the
    /// returned [`ExecutionResult`].
    pub async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.execute_with_stdin(code, "", timeout).await
    }

    /// [`SessionExecutor::execute`] with `stdin` readable by the code.
    ///
    /// # Errors
    /// Same as [`SessionExecutor::execute`].
    pub async fn execute_with_stdin(
        &self,
        code: &str,
        stdin: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        let frame = session_frame(code, stdin);
        tracing::debug!(
            container = %self.container,
            code_len = code.len(),
            stdin_len = stdin.len(),
            frame_len = frame.len(),
            "sending session frame"
        );

        let command = bootstrap_command();
        let started = Instant::now();
        let exec = self.runtime.exec(self.container, &command, frame);

        let Ok(output) = tokio::time::timeout(timeout, exec).await else {
            let elapsed = started.elapsed();
            tracing::warn!(
                container = %self.container,
                timeout_secs = timeout.as_secs_f64(),
                "session execution timed out"
            );
            let kill = self.runtime.kill_matching(self.container, RUNNER_PROCESS_PATTERN);
            match tokio::time::timeout(KILL_GRACE, kill).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        container = %self.container,
                        "failed to kill timed-out runner: {e}"
                    );
                }
                Err(_) => tracing::warn!(
                    container = %self.container,
                    grace_secs = KILL_GRACE.as_secs(),
                    "runner kill did not finish in time; leaving it to the next stop"
                ),
            }
            return Ok(ExecutionResult::timed_out(timeout, elapsed));
        };

        let output = output?;
        let elapsed = started.elapsed();
        let result =
            parse_runner_output(&output.stdout, &output.stderr, output.exit_code, elapsed);

        tracing::info!(
            container = %self.container,
            exit_code = result.exit_code(),
            elapsed_ms = elapsed.as_millis(),
            "session execution complete"
        );
        Ok(result)
    }
}
