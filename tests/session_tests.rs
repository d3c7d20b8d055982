//! Session tests: background loading and recovery from poisoned instances.


use std::time::Duration;

use sandbox_orchestrator::config::OrchestratorConfig;
use sandbox_orchestrator::error::OrchestratorError;
use sandbox_orchestrator::protocol::Event;
use sandbox_orchestrator::session::Session;
use sandbox_orchestrator::status::WorkerStatus;
use test_harness::{request, status_log, wait_until, Reply, ScriptedLauncher};

const TIMEOUT: Duration = Duration::from_secs(30);

fn start(launcher: &ScriptedLauncher) -> Session {
    Session::start(
        OrchestratorConfig::default().with_execution_timeout(TIMEOUT),
        launcher.shared(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_session_loads_in_background() {
    let launcher = ScriptedLauncher::new();
    let session = start(&launcher);

    wait_until(|| {
        let status = session.status();
        async move { status == WorkerStatus::Ready }
    })
    .await;
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_for_load_in_progress() {
    let launcher =
        ScriptedLauncher::new().on_init(Reply::After(Duration::from_secs(2), Event::Ready));
    let session = start(&launcher);

    let result = session.run(request()).await;

    assert!(result.is_ok(), "{result:?}");
    assert_eq!(launcher.launches(), 1);
    assert_eq!(launcher.inits(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_replaces_orchestrator() {
    let launcher = ScriptedLauncher::new().on_run(Reply::Hang);
    let session = start(&launcher);
    let first = session.orchestrator();

    let err = session.run(request()).await.unwrap_err();
    assert_eq!(err, OrchestratorError::Timeout(TIMEOUT));
    assert_eq!(first.status(), WorkerStatus::Error);
    assert_eq!(session.last_error(), Some(err.to_string()));
    assert!(!session.orchestrator().same_instance(&first));

    // The next caller waits for the replacement instead of seeing NotReady.
    let result = session.run(request()).await.unwrap();
    assert_eq!(result.exit_code, 0);
    assert_eq!(session.last_error(), None);
    assert_eq!(session.status(), WorkerStatus::Ready);
    assert_eq!(launcher.launches(), 2);
    assert_eq!(launcher.runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_observers_follow_replacement() {
    let launcher = ScriptedLauncher::new().on_run(Reply::Hang);
    let session = start(&launcher);
    let (log, observer) = status_log();
    let _subscription = session.subscribe(observer);

    session.run(request()).await.unwrap_err();
    session.run(request()).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            WorkerStatus::Idle,
            WorkerStatus::Loading,
            WorkerStatus::Ready,
            WorkerStatus::Running,
            WorkerStatus::Error,
            // replacement
            WorkerStatus::Idle,
            WorkerStatus::Loading,
            WorkerStatus::Ready,
            WorkerStatus::Running,
            WorkerStatus::Ready,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribed_observer_is_not_reattached() {
    let launcher = ScriptedLauncher::new().on_run(Reply::Hang);
    let session = start(&launcher);
    let (log, observer) = status_log();
    let subscription = session.subscribe(observer);

    subscription.unsubscribe();
    session.run(request()).await.unwrap_err();
    session.run(request()).await.unwrap();

    assert_eq!(*log.lock().unwrap(), vec![WorkerStatus::Idle]);
}

#[tokio::test(start_paused = true)]
async fn test_execution_error_keeps_orchestrator() {
    let launcher = ScriptedLauncher::new().on_run(Reply::error("NameError: name 'x' is not defined"));
    let session = start(&launcher);
    let first = session.orchestrator();

    let err = session.run(request()).await.unwrap_err();

    assert_eq!(
        err,
        OrchestratorError::Execution("NameError: name 'x' is not defined".to_string())
    );
    assert!(session.orchestrator().same_instance(&first));
    assert_eq!(session.status(), WorkerStatus::Ready);
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_background_load_is_rebuilt_on_next_run() {
    let launcher = ScriptedLauncher::new()
        .on_init(Reply::error("Failed to initialize runtime: No module named 'pytest'"));
    let session = start(&launcher);

    wait_until(|| {
        let failed = session.last_error().is_some();
        async move { failed }
    })
    .await;
    assert_eq!(session.status(), WorkerStatus::Error);
    assert_eq!(
        session.last_error().as_deref(),
        Some("Runtime failed to initialize: Failed to initialize runtime: No module named 'pytest'")
    );

    let result = session.run(request()).await;

    assert!(result.is_ok(), "{result:?}");
    assert_eq!(session.last_error(), None);
    assert_eq!(launcher.launches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_current_orchestrator() {
    let launcher = ScriptedLauncher::new();
    let session = start(&launcher);
    session.run(request()).await.unwrap();

    session.shutdown().await;

    assert_eq!(session.status(), WorkerStatus::Idle);
    let orchestrator = session.orchestrator();
    wait_until(|| {
        let closed = orchestrator.is_closed();
        async move { closed }
    })
    .await;
    assert_eq!(launcher.kills(), 1);
}
