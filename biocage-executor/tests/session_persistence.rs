//! Integration tests for cross-call session state.
//!
//! These tests require a Docker daemon.
//! Run with: `cargo test --test session_persistence -- --ignored`

use biocage_executor::{DockerBackend, RunOptions, Sandbox, SandboxConfig};

async fn running_sandbox() -> Sandbox<DockerBackend> {
    Sandbox::open(DockerBackend::with_defaults(), SandboxConfig::default())
        .await
        .expect("container start failed")
}

fn lenient() -> RunOptions {
    RunOptions::default().lenient()
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn variable_survives_into_next_call() {
    let mut sandbox = running_sandbox().await;
    let first = sandbox.run("x = 10", RunOptions::default()).await;
    assert!(first.success(), "{first:?}");
    let second = sandbox.run("print(x + 5)", RunOptions::default()).await;
    assert!(second.success(), "{second:?}");
    assert!(second.stdout().contains("15"));
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn imports_and_functions_are_replayed() {
    let mut sandbox = running_sandbox().await;
    let setup = "import math\nfrom collections import Counter as C\n\ndef area(r):\n    return math.pi * r * r\n";
    assert!(sandbox.run(setup, lenient()).await.success());

    let result = sandbox
        .run("print(round(area(2), 2))\nprint(C('aab')['a'])", lenient())
        .await;
    assert!(result.success(), "{result:?}");
    assert!(result.stdout().contains("12.57"));
    assert!(result.stdout().contains('2'));

    let summary = sandbox.inspect_session().await.expect("inspect failed");
    assert!(summary.imports.iter().any(|i| i == "import math"));
    assert!(summary.imports.iter().any(|i| i == "from collections import Counter as C"));
    assert!(summary.functions.iter().any(|f| f.starts_with("def area(r):")));
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn unpicklable_values_are_reported_not_fatal() {
    let mut sandbox = running_sandbox().await;
    let result = sandbox
        .run("gen = (i for i in range(3))\nkept = [1, 2, 3]", lenient())
        .await;
    assert!(result.success(), "{result:?}");
    assert!(result.dropped_variables().iter().any(|d| d.name == "gen"));

    let next = sandbox.run("print(sum(kept))", lenient()).await;
    assert!(next.stdout().contains('6'), "{next:?}");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn code_containing_frame_like_lines_runs_verbatim() {
    let mut sandbox = running_sandbox().await;
    let code = "s = '''\n---ENDSCRIPT---\nBIOCAGE/1 0 00 AA\n'''\nprint(len(s.splitlines()))\n";
    let result = sandbox.run(code, lenient()).await;
    assert!(result.success(), "{result:?}");
    assert!(result.stdout().contains('3'));
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn restart_discards_session_state() {
    let mut sandbox = running_sandbox().await;
    assert!(sandbox.run("token = 'abc'", lenient()).await.success());
    sandbox.restart(None).await.expect("restart failed");
    let result = sandbox.run("print(token)", lenient()).await;
    assert!(result.stderr().contains("NameError"), "state must not survive a restart: {result:?}");
    sandbox.close().await;
}

#[tokio::test]
#[ignore = "requires a Docker daemon"]
async fn system_exit_code_is_reported() {
    let mut sandbox = running_sandbox().await;
    let result = sandbox.run("import sys\nprint('bye')\nsys.exit(3)", lenient()).await;
    assert_eq!(result.exit_code(), 3);
    assert!(result.stdout().contains("bye"));
    assert!(result.error().is_none());
    sandbox.close().await;
}
