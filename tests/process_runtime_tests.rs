//! End-to-end tests against a real Python runtime.
//!
//! Skipped (with a note on stderr) when `python3` or pytest is missing.

use std::sync::Arc;
use std::time::Duration;

use sandbox_orchestrator::config::{OrchestratorConfig, SandboxConfig};
use sandbox_orchestrator::coordinator::Orchestrator;
use sandbox_orchestrator::error::OrchestratorError;
use sandbox_orchestrator::protocol::ExecutionRequest;
use sandbox_orchestrator::status::WorkerStatus;
use sandbox_orchestrator::worker::ProcessLauncher;

const SOLUTION: &str = r#"
class Counter:
    def __init__(self):
        self.value = 0

    def bump(self):
        print("bumping")  # must not corrupt the protocol stream
        self.value += 1
        return self.value
"#;

const TESTS: &str = r#"
import time
from counter import Counter


class TestLevel1:
    def test_bump(self):
        assert Counter().bump() == 1

    def test_sleep_is_virtual(self):
        start = time.monotonic()
        time.sleep(3600)
        assert time.monotonic() - start >= 3600


class TestLevel2:
    def test_wrong(self):
        assert Counter().bump() == 2
"#;

fn pytest_available() -> bool {
    let available = std::process::Command::new("python3")
        .args(["-c", "import pytest"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false);
    if !available {
        eprintln!("python3 with pytest not found, skipping");
    }
    available
}

fn spawn(timeout: Duration) -> Orchestrator {
    Orchestrator::spawn(
        OrchestratorConfig::default().with_execution_timeout(timeout),
        Arc::new(ProcessLauncher::new(SandboxConfig::default())),
    )
}

fn request() -> ExecutionRequest {
    ExecutionRequest::new("counter", SOLUTION, "test_counter.py", TESTS)
}

#[tokio::test]
async fn test_runs_suite_with_virtual_clock() {
    if !pytest_available() {
        return;
    }
    let orchestrator = spawn(Duration::from_secs(30));
    orchestrator.initialize().await.unwrap();

    let result = orchestrator.submit(request()).await.unwrap();

    let summary = result.summary();
    assert_eq!(summary.total, 3);
    assert_eq!(summary.passed, 2);
    assert_ne!(result.exit_code, 0);
    let wrong = result
        .outcomes
        .iter()
        .find(|o| o.name == "test_wrong")
        .unwrap();
    assert!(!wrong.passed);
    assert!(wrong.error_detail.is_some());
    assert_eq!(orchestrator.status(), WorkerStatus::Ready);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_level_filter_selects_one_class() {
    if !pytest_available() {
        return;
    }
    let orchestrator = spawn(Duration::from_secs(30));
    orchestrator.initialize().await.unwrap();

    let result = orchestrator.submit(request().with_level(1)).await.unwrap();

    assert_eq!(result.exit_code, 0);
    let names: Vec<_> = result.outcomes.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["test_bump", "test_sleep_is_virtual"]);
    assert!(result.summary().all_passed);

    orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_infinite_loop_is_torn_down() {
    if !pytest_available() {
        return;
    }
    let orchestrator = spawn(Duration::from_secs(2));
    orchestrator.initialize().await.unwrap();
    let spinning = ExecutionRequest::new(
        "spin",
        "def spin():\n    while True:\n        pass\n",
        "test_spin.py",
        "from spin import spin\n\ndef test_spin():\n    spin()\n",
    );

    let err = orchestrator.submit(spinning).await.unwrap_err();

    assert_eq!(err, OrchestratorError::Timeout(Duration::from_secs(2)));
    assert_eq!(orchestrator.status(), WorkerStatus::Error);
}

#[tokio::test]
async fn test_resubmitted_module_is_reimported() {
    if !pytest_available() {
        return;
    }
    let orchestrator = spawn(Duration::from_secs(30));
    orchestrator.initialize().await.unwrap();
    let suite = "from counter import Counter\n\n\
                 def test_bump():\n    assert Counter().bump() == 1\n";
    let broken = "class Counter:\n    def bump(self):\n        return 0\n";

    let first = orchestrator
        .submit(ExecutionRequest::new("counter", broken, "test_counter.py", suite))
        .await
        .unwrap();
    assert_eq!(first.summary().passed, 0);
    assert_eq!(first.summary().total, 1);

    let second = orchestrator
        .submit(ExecutionRequest::new("counter", SOLUTION, "test_counter.py", suite))
        .await
        .unwrap();
    assert!(second.summary().all_passed, "{:?}", second.outcomes);
    assert_eq!(second.exit_code, 0);

    orchestrator.shutdown().await;
}
