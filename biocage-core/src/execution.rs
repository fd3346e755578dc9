use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reserved for executions cut off by the wall-clock timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// The outcome of one code execution, persistent or ephemeral.
///
/// Results are immutable once created: fields are only readable through
/// accessors. `success` is derived, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ExecutionResult {
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
    exit_code: i32,
    /// Wall-clock duration, serialized as fractional seconds.
    #[serde(with = "secs_f64", default)]
    execution_time: Duration,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dropped_variables: Vec<DroppedVariable>,
    /// Set only by [`ExecutionResult::timed_out`]; a bare exit code of 124
    /// from user code is not a timeout.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    timed_out: bool,
}

impl ExecutionResult {
    /// Create a new execution result.
    ///
    /// # Arguments
    /// - `stdout`: captured standard output
    /// - `stderr`: captured standard error
    /// - `exit_code`: `0` on success; `124` is reserved for [`ExecutionResult::timed_out`]
    /// - `execution_time`: wall-clock elapsed time
    /// - `error`: set only when the execution machinery itself failed
    #[must_use]
    pub fn new(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        exit_code: i32,
        execution_time: Duration,
        error: Option<String>,
    ) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            execution_time,
            error,
            dropped_variables: Vec::new(),
            timed_out: false,
        }
    }

    /// Result for an execution cut off after `timeout`.
    #[must_use]
    pub fn timed_out(timeout: Duration, elapsed: Duration) -> Self {
        let message = format!("code execution timed out after {} seconds", timeout.as_secs_f64());
        Self { timed_out: true, ..Self::new("", "", TIMEOUT_EXIT_CODE, elapsed, Some(message)) }
    }

    /// Result for a failure of the execution machinery rather than the code.
    #[must_use]
    pub fn infrastructure(message: impl Into<String>, elapsed: Duration) -> Self {
        Self::new("", "", 1, elapsed, Some(message.into()))
    }

    /// Attach the variables the runner could not carry into the next call.
    #[must_use]
    pub fn with_dropped_variables(mut self, dropped: Vec<DroppedVariable>) -> Self {
        self.dropped_variables = dropped;
        self
    }

    /// `true` when the exit code is zero and no machinery error was recorded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    #[must_use]
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Variables the runner dropped from the session state during this call.
    #[must_use]
    pub fn dropped_variables(&self) -> &[DroppedVariable] {
        &self.dropped_variables
    }

    /// `true` only for results built by [`ExecutionResult::timed_out`].
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

/// A session variable that failed the serialization check and was not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct DroppedVariable {
    /// Name the variable was bound to in the session namespace.
    pub name: String,
    /// Why the value could not be captured (exception type and message).
    pub reason: String,
}

impl DroppedVariable {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { name: name.into(), reason: reason.into() }
    }
}

mod secs_f64 {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
