//! Recovering an [`ExecutionResult`] from the runner's captured output.

use std::time::Duration;

use biocage_core::{DroppedVariable, ExecutionResult};
use serde::Deserialize;

/// Exit codes the docker CLI reserves for its own failures
/// (daemon error, command not executable, command not found).
const RUNTIME_EXIT_CODES: [i32; 3] = [125, 126, 127];

const DAEMON_ERROR_MARKER: &str = "Error response from daemon";

/// The JSON record the runner prints as its last line.
///
/// Every field is optional so that partial records from older runners or
/// one-shot entrypoints still parse.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RunnerRecord {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i32>,
    pub execution_time: Option<f64>,
    pub error: Option<String>,
    pub dropped: Vec<DroppedVariable>,
}

impl RunnerRecord {
    /// Find the record in `stdout`: the last non-empty line, or else the
    /// whole output when it is a single (possibly pretty-printed) object.
    #[must_use]
    pub fn locate(stdout: &str) -> Option<Self> {
        let last_line = stdout.lines().rev().find(|line| !line.trim().is_empty())?;
        serde_json::from_str::<Self>(last_line.trim())
            .or_else(|_| serde_json::from_str::<Self>(stdout.trim()))
            .ok()
    }

    fn into_result(self, process_exit: i32, elapsed: Duration) -> ExecutionResult {
        let execution_time = self
            .execution_time
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(elapsed);
        ExecutionResult::new(
            self.stdout.unwrap_or_default(),
            self.stderr.unwrap_or_default(),
            self.exit_code.unwrap_or(process_exit),
            execution_time,
            self.error,
        )
        .with_dropped_variables(self.dropped)
    }
}

/// Build an [`ExecutionResult`] from what an exec or one-shot run produced.
///
/// `exit_code` is the runtime client's exit status (`None` if it was
/// killed by a signal); `elapsed` is the wall-clock time measured by the
/// caller and is used when the record does not carry its own timing.
#[must_use]
pub fn parse_runner_output(
    stdout: &str,
    stderr: &str,
    exit_code: Option<i32>,
    elapsed: Duration,
) -> ExecutionResult {
    let process_exit = exit_code.unwrap_or(-1);

    if let Some(record) = RunnerRecord::locate(stdout) {
        let result = record.into_result(process_exit, elapsed);
        for dropped in result.dropped_variables() {
            tracing::warn!(
                variable = %dropped.name,
                reason = %dropped.reason,
                "session variable could not be persisted"
            );
        }
        return result;
    }

    tracing::debug!(
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        exit_code = process_exit,
        "no runner record in output"
    );

    if stderr.contains(DAEMON_ERROR_MARKER) || RUNTIME_EXIT_CODES.contains(&process_exit) {
        let reason = stderr.trim();
        let message = if reason.is_empty() {
            format!("container runtime failed with exit code {process_exit}")
        } else {
            format!("container runtime failed: {reason}")
        };
        return ExecutionResult::new(stdout, stderr, process_exit, elapsed, Some(message));
    }

    ExecutionResult::new(stdout, stderr, process_exit, elapsed, None)
}
