//! Integration tests for container lifecycle, isolation and failure policy.
//!
//! These tests require a Docker daemon and pull `python:3.12-slim`.
//! Run with: `cargo test --test sandbox_lifecycle -- --ignored`

use std::time::{Duration, Instant};

use biocage_core::AccessMode;
use biocage_executor::{
    ContainerRuntime, DockerBackend, ErrorCategory, LifecycleState, RunOptions, Sandbox,
    SandboxConfig,
};

async fn running_sandbox() -> Sandbox<DockerBackend> {
    let mut sandbox = Sandbox::new(DockerBackend::with_defaults(), SandboxConfig::default());
    sandbox.start_configured().await.expect("container start failed");
    sandbox
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn docker_health_check_passes() {
    DockerBackend::with_defaults()
        .health_check()
        .await
        .expect("docker must be reachable");
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn start_stop_is_idempotent() {
    let mut sandbox = running_sandbox().await;
    assert_eq!(sandbox.state(), LifecycleState::Running);

    let start = Instant::now();
    sandbox.stop().await;
    println!("stop time: {:?}", start.elapsed());
    sandbox.stop().await;
    assert_eq!(sandbox.state(), LifecycleState::Stopped);
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn successful_execution_has_no_error() {
    let mut sandbox = running_sandbox().await;
    let result = sandbox.run("print('hello from biocage')", RunOptions::default()).await;
    assert!(result.success(), "unexpected failure: {result:?}");
    assert_eq!(result.exit_code(), 0);
    assert!(result.error().is_none());
    assert!(result.stdout().contains("hello from biocage"));
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn infinite_loop_times_out_and_tears_down() {
    let mut sandbox = running_sandbox().await;
    let opts = RunOptions::default().with_timeout(Duration::from_secs(2)).lenient();
    let result = sandbox.run("while True:\n    pass\n", opts).await;
    assert_eq!(result.exit_code(), 124);
    assert!(!sandbox.is_running(), "a timed-out sandbox must be torn down");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn division_by_zero_keeps_partial_output() {
    let mut sandbox = running_sandbox().await;
    let code = "print('before error')\nx = 1 / 0\nprint('after error')\n";
    let (result, verdict) = sandbox.run_assessed(code, RunOptions::default()).await;
    assert!(!result.success());
    assert_ne!(result.exit_code(), 0);
    assert!(result.stdout().contains("before error"));
    assert!(!result.stdout().contains("after error"));
    assert_eq!(verdict.category, Some(ErrorCategory::ZeroDivision));
    assert!(!sandbox.is_running(), "strict policy tears down after a user error");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn lenient_policy_keeps_session_after_error() {
    let mut sandbox = running_sandbox().await;
    let opts = RunOptions::default().lenient();
    assert!(sandbox.run("value = 42", opts).await.success());
    let failed = sandbox.run("undefined_name + 1", opts).await;
    assert!(failed.stderr().contains("NameError"));
    assert!(sandbox.is_running());
    let retry = sandbox.run("print(value)", opts).await;
    assert!(retry.stdout().contains("42"), "session must survive the error: {retry:?}");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn network_is_disabled_by_default() {
    let mut sandbox = running_sandbox().await;
    let code = "import socket\ns = socket.create_connection(('1.1.1.1', 80), timeout=3)\nprint('connected')\n";
    let result = sandbox.run(code, RunOptions::default().lenient()).await;
    assert!(!result.success());
    assert!(!result.stdout().contains("connected"));
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn root_filesystem_is_read_only() {
    let mut sandbox = running_sandbox().await;
    let code = "open('/usr/biocage-write-check', 'w').write('x')\n";
    let result = sandbox.run(code, RunOptions::default().lenient()).await;
    assert!(!result.success());
    assert!(result.stderr().contains("Read-only file system") || result.stderr().contains("Errno"));

    let scratch = sandbox
        .run("open('/app/workspace/write-check.txt', 'w').write('x')\n", RunOptions::default().lenient())
        .await;
    assert!(scratch.success(), "the workspace scratch mount must be writable: {scratch:?}");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn read_only_directory_can_be_read_not_written() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("input.txt"), "shared contents").expect("fixture");

    let mut sandbox = running_sandbox().await;
    let outcome = sandbox
        .expose_directory(dir.path(), Some("/app/shared/input"), AccessMode::ReadOnly)
        .await
        .expect("expose failed");
    assert!(outcome.restarted, "exposing while running restarts the container");

    let opts = RunOptions::default().lenient();
    let read = sandbox.run("print(open('/app/shared/input/input.txt').read())", opts).await;
    assert!(read.stdout().contains("shared contents"), "{read:?}");

    let write = sandbox.run("open('/app/shared/input/new.txt', 'w').write('x')", opts).await;
    assert!(!write.success(), "a read-only mount must reject writes");
    assert!(!dir.path().join("new.txt").exists());
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn read_write_directory_is_visible_on_host() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = SandboxConfig::default().expose_directory_rw(dir.path(), "/app/output");
    let mut sandbox = Sandbox::open(DockerBackend::with_defaults(), config)
        .await
        .expect("open failed");

    let result = sandbox
        .run("open('/app/output/result.txt', 'w').write('Hello!')", RunOptions::default())
        .await;
    assert!(result.success(), "{result:?}");
    let written = std::fs::read_to_string(dir.path().join("result.txt")).expect("file on host");
    assert_eq!(written, "Hello!");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn temporary_artifact_is_readable_and_removed() {
    let mut sandbox = running_sandbox().await;
    let outcome = sandbox
        .create_temporary_artifact("alpha,beta\n", ".csv")
        .await
        .expect("artifact failed");
    let code = format!("print(open('{}').read())", outcome.container_path);
    let result = sandbox.run(&code, RunOptions::default()).await;
    assert!(result.stdout().contains("alpha,beta"), "{result:?}");

    let host = sandbox.exposed_paths().iter().next().map(|b| b.host_path.clone()).expect("binding");
    sandbox.cleanup().await;
    assert!(!host.exists());
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn stopped_sandbox_runs_ephemerally() {
    let mut sandbox = Sandbox::new(DockerBackend::with_defaults(), SandboxConfig::default());
    let first = sandbox.run("x = 5\nprint(x)", RunOptions::default()).await;
    assert!(first.stdout().contains('5'), "{first:?}");
    let second = sandbox.run("print(x)", RunOptions::default()).await;
    assert!(second.stderr().contains("NameError"), "ephemeral runs share no state");
    assert_eq!(sandbox.state(), LifecycleState::Stopped);
}
