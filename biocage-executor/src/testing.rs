//! Scripted in-memory container runtime for unit tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use biocage_core::{ContainerId, ContainerName};

use crate::backend::{ContainerRuntime, ProcessOutput};
use crate::{ContainerSpec, ExecutorError};

/// One observed runtime call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    ImageExists(String),
    BuildImage(String),
    PullImage(String),
    Launch(ContainerName),
    Exec(ContainerName),
    RunOnce(ContainerName),
    Stop(ContainerName),
    Remove(ContainerName),
    KillMatching(ContainerName, String),
    Abandon(ContainerName),
}

/// What the next `exec` or `run_once` does.
pub(crate) enum ExecBehavior {
    Output(ProcessOutput),
    /// Never completes; only a timeout ends it.
    Hang,
    /// The client process cannot be spawned.
    Fail,
}

impl ExecBehavior {
    /// A well-formed runner record on stdout.
    pub(crate) fn record(stdout: &str, stderr: &str, exit_code: i32) -> Self {
        let record = serde_json::json!({
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": exit_code,
            "execution_time": 0.001,
            "error": null,
            "dropped": [],
        });
        Self::Output(ProcessOutput::new(format!("{record}\n"), "", Some(0)))
    }

    pub(crate) fn raw(stdout: &str) -> Self {
        Self::Output(ProcessOutput::new(stdout, "", Some(0)))
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    behaviors: VecDeque<ExecBehavior>,
    exec_stdins: Vec<Vec<u8>>,
    specs: Vec<ContainerSpec>,
    image_missing: bool,
    fail_launch: bool,
    fail_stop: bool,
    hang_cleanup: bool,
    launches: u32,
}

/// Records every call and answers from a queue of scripted behaviours.
#[derive(Default)]
pub(crate) struct ScriptedRuntime {
    state: Mutex<State>,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn push_exec(&self, behavior: ExecBehavior) {
        self.state().behaviors.push_back(behavior);
    }

    pub(crate) fn set_image_missing(&self) {
        self.state().image_missing = true;
    }

    pub(crate) fn set_fail_launch(&self, fail: bool) {
        self.state().fail_launch = fail;
    }

    pub(crate) fn set_fail_stop(&self) {
        self.state().fail_stop = true;
    }

    /// Make `kill_matching` and `remove` never complete.
    pub(crate) fn set_hang_cleanup(&self) {
        self.state().hang_cleanup = true;
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub(crate) fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.state().calls.iter().filter(|c| matches(c)).count()
    }

    pub(crate) fn exec_stdins(&self) -> Vec<Vec<u8>> {
        self.state().exec_stdins.clone()
    }

    pub(crate) fn launched_specs(&self) -> Vec<ContainerSpec> {
        self.state().specs.clone()
    }

    async fn answer(&self, call: Call, stdin: Vec<u8>) -> Result<ProcessOutput, ExecutorError> {
        let behavior = {
            let mut state = self.state();
            state.calls.push(call);
            state.exec_stdins.push(stdin);
            state.behaviors.pop_front()
        };
        match behavior.unwrap_or_else(|| ExecBehavior::record("", "", 0)) {
            ExecBehavior::Output(output) => Ok(output),
            ExecBehavior::Hang => std::future::pending().await,
            ExecBehavior::Fail => Err(ExecutorError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted client failure",
            ))),
        }
    }
}

#[async_trait]
impl ContainerRuntime for ScriptedRuntime {
    async fn image_exists(&self, image: &str) -> Result<bool, ExecutorError> {
        let mut state = self.state();
        state.calls.push(Call::ImageExists(image.to_owned()));
        Ok(!state.image_missing)
    }

    async fn build_image(&self, image: &str, _context: &Path) -> Result<(), ExecutorError> {
        let mut state = self.state();
        state.calls.push(Call::BuildImage(image.to_owned()));
        state.image_missing = false;
        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), ExecutorError> {
        let mut state = self.state();
        state.calls.push(Call::PullImage(image.to_owned()));
        state.image_missing = false;
        Ok(())
    }

    async fn launch(&self, spec: &ContainerSpec) -> Result<ContainerId, ExecutorError> {
        let mut state = self.state();
        state.calls.push(Call::Launch(spec.name.clone()));
        if state.fail_launch {
            return Err(ExecutorError::LaunchFailed("scripted launch failure".to_owned()));
        }
        state.launches += 1;
        state.specs.push(spec.clone());
        Ok(ContainerId::new(format!("{:064x}", state.launches)))
    }

    async fn exec(
        &self,
        container: &ContainerName,
        _command: &[&str],
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        self.answer(Call::Exec(container.clone()), stdin).await
    }

    async fn run_once(
        &self,
        spec: &ContainerSpec,
        stdin: Vec<u8>,
    ) -> Result<ProcessOutput, ExecutorError> {
        self.state().specs.push(spec.clone());
        self.answer(Call::RunOnce(spec.name.clone()), stdin).await
    }

    async fn stop(&self, container: &ContainerName) -> Result<(), ExecutorError> {
        let mut state = self.state();
        state.calls.push(Call::Stop(container.clone()));
        if state.fail_stop {
            return Err(ExecutorError::CommandFailed {
                command: "stop".to_owned(),
                reason: "scripted stop failure".to_owned(),
            });
        }
        Ok(())
    }

    async fn remove(&self, container: &ContainerName) -> Result<(), ExecutorError> {
        let hang = {
            let mut state = self.state();
            state.calls.push(Call::Remove(container.clone()));
            state.hang_cleanup
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn kill_matching(
        &self,
        container: &ContainerName,
        pattern: &str,
    ) -> Result<(), ExecutorError> {
        let hang = {
            let mut state = self.state();
            state.calls.push(Call::KillMatching(container.clone(), pattern.to_owned()));
            state.hang_cleanup
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn abandon(&self, container: &ContainerName) {
        self.state().calls.push(Call::Abandon(container.clone()));
    }
}
