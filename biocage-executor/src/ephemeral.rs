//! One-shot execution in a fresh, auto-removed container.

use std::time::{Duration, Instant};

use biocage_core::{ContainerName, ExecutionResult, ExposedPath, ResourceLimits};

use crate::backend::ContainerRuntime;
use crate::framing::{ephemeral_request, SESSION_RUNNER};
use crate::output::parse_runner_output;
use crate::runner::KILL_GRACE;
use crate::{ContainerSpec, ExecutorError, LaunchMode};

/// Allowance for container creation on top of the caller's timeout.
pub const STARTUP_GRACE: Duration = Duration::from_secs(5);

/// Runs code in a throwaway container that shares nothing with any session.
///
/// The container gets the same hardening, limits and mounts as the owning
/// sandbox's persistent container would.
pub struct EphemeralExecutor<'a, R: ContainerRuntime> {
    runtime: &'a R,
    image: &'a str,
    name_prefix: &'a str,
    limits: ResourceLimits,
    mounts: Vec<ExposedPath>,
}

impl<'a, R: ContainerRuntime> EphemeralExecutor<'a, R> {
    #[must_use]
    pub fn new(
        runtime: &'a R,
        image: &'a str,
        name_prefix: &'a str,
        limits: ResourceLimits,
        mounts: Vec<ExposedPath>,
    ) -> Self {
        Self { runtime, image, name_prefix, limits, mounts }
    }

    fn spec(&self, runner_args: [String; 3]) -> ContainerSpec {
        let command = ["python3", "-c", SESSION_RUNNER]
            .into_iter()
            .map(str::to_owned)
            .chain(runner_args)
            .collect();
        ContainerSpec::new(
            ContainerName::generate(&format!("{}-once", self.name_prefix)),
            self.image,
            self.limits,
            self.mounts.clone(),
            LaunchMode::Once { command },
        )
    }

    /// Run `code` to completion in a new container.
    ///
    /// # Errors
    /// Returns an error only when the runtime client could not be run.
    pub async fn execute(
        &self,
        code: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.execute_with_stdin(code, "", timeout).await
    }

    /// [`EphemeralExecutor::execute`] with `stdin` readable by the code.
    ///
    /// # Errors
    /// Returns an error only when the runtime client could not be run.
    pub async fn execute_with_stdin(
        &self,
        code: &str,
        stdin: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        let (runner_args, body) = ephemeral_request(code, stdin);
        let spec = self.spec(runner_args);
        tracing::info!(
            container = %spec.name,
            code_len = code.len(),
            stdin_len = stdin.len(),
            "starting ephemeral execution"
        );

        let started = Instant::now();
        let run = self.runtime.run_once(&spec, body);

        let Ok(output) = tokio::time::timeout(timeout + STARTUP_GRACE, run).await else {
            let elapsed = started.elapsed();
            tracing::warn!(container = %spec.name, "ephemeral execution timed out");
            match tokio::time::timeout(KILL_GRACE, self.runtime.remove(&spec.name)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(
                        container = %spec.name,
                        "failed to remove timed-out container: {e}"
                    );
                }
                Err(_) => tracing::warn!(
                    container = %spec.name,
                    "removing timed-out container did not finish in time"
                ),
            }
            return Ok(ExecutionResult::timed_out(timeout, elapsed));
        };

        let output = output?;
        let elapsed = started.elapsed();
        Ok(parse_runner_output(&output.stdout, &output.stderr, output.exit_code, elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::code_digest;
    use crate::testing::{Call, ExecBehavior, ScriptedRuntime};

    fn executor(runtime: &ScriptedRuntime) -> EphemeralExecutor<'_, ScriptedRuntime> {
        EphemeralExecutor::new(runtime, "img", "biocage", ResourceLimits::default(), Vec::new())
    }

    #[tokio::test]
    async fn code_goes_to_stdin_of_a_one_shot_container() {
        let runtime = ScriptedRuntime::new();
        runtime.push_exec(ExecBehavior::record("hello\n", "", 0));
        let executor = executor(&runtime);

        let result = match executor.execute("print('hello')", Duration::from_secs(5)).await {
            Ok(r) => r,
            Err(e) => panic!("execute failed: {e}"),
        };
        assert_eq!(result.stdout(), "hello\n");
        assert_eq!(runtime.exec_stdins(), vec![b"print('hello')".to_vec()]);

        let specs = runtime.launched_specs();
        let Some(spec) = specs.first() else { panic!("no spec recorded") };
        assert!(spec.name.as_str().starts_with("biocage-once-"));
        let LaunchMode::Once { command } = &spec.mode else { panic!("one-shot launch expected") };
        let tail: Vec<&str> = command.iter().rev().take(3).rev().map(String::as_str).collect();
        assert_eq!(tail, ["--ephemeral", "14", code_digest(b"print('hello')").as_str()]);
    }

    #[tokio::test]
    async fn stdin_input_follows_the_code() {
        let runtime = ScriptedRuntime::new();
        let executor = executor(&runtime);
        let run = executor.execute_with_stdin("print(input())", "42\n", Duration::from_secs(5));
        if let Err(e) = run.await {
            panic!("execute failed: {e}");
        }
        assert_eq!(runtime.exec_stdins(), vec![b"print(input())42\n".to_vec()]);
    }

    #[tokio::test]
    async fn each_run_uses_a_fresh_container() {
        let runtime = ScriptedRuntime::new();
        let executor = executor(&runtime);
        for _ in 0..2 {
            if let Err(e) = executor.execute("pass", Duration::from_secs(1)).await {
                panic!("execute failed: {e}");
            }
        }
        let specs = runtime.launched_specs();
        assert_eq!(specs.len(), 2);
        assert_ne!(specs[0].name, specs[1].name, "one-shot containers must not be reused");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_removes_the_container() {
        let runtime = ScriptedRuntime::new();
        runtime.push_exec(ExecBehavior::Hang);
        let executor = executor(&runtime);

        let result = match executor.execute("while True: pass", Duration::from_secs(2)).await {
            Ok(r) => r,
            Err(e) => panic!("execute failed: {e}"),
        };
        assert!(result.is_timeout());
        assert_eq!(runtime.count(|c| matches!(c, Call::Remove(_))), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wedged_removal_is_abandoned_after_the_grace_period() {
        let runtime = ScriptedRuntime::new();
        runtime.push_exec(ExecBehavior::Hang);
        runtime.set_hang_cleanup();
        let executor = executor(&runtime);
        let timeout = Duration::from_secs(1);

        let bound = timeout + STARTUP_GRACE + KILL_GRACE + Duration::from_secs(1);
        let run = executor.execute("while True: pass", timeout);
        let result = match tokio::time::timeout(bound, run).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => panic!("execute failed: {e}"),
            Err(_) => panic!("execute blocked on container removal"),
        };
        assert!(result.is_timeout());
    }
}
