//! Integration tests for confirming, launching, joining, stopping and
//! collecting plans

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use shuttle::{
    ExecutionOptions, ExecutionState, InputValue, Inputs, LaunchStatus, Plan, RunOutcome,
    Runtime, ScriptedConsole, ShuttleError, Task,
};
use tempfile::TempDir;

use common::{logged_in_session, remote_tasks, FakeGateway};

const TICK: Duration = Duration::from_millis(1);

fn mock_plan(n: usize, runtime_args: Inputs) -> Result<Plan> {
    let spec = shuttle::RuntimeSpec::new(shuttle::RuntimeKind::Mock, runtime_args);
    let runtime = Arc::new(Runtime::from_spec(spec, &shuttle::Session::anonymous())?);
    Ok(Plan::new(
        (0..n)
            .map(|i| Task::new(format!("t{}", i), "echo", Inputs::new(), runtime.clone()))
            .collect(),
    ))
}

async fn launch_silently(plan: &mut Plan) -> Result<shuttle::LaunchReport> {
    match plan.run(true, &mut ScriptedConsole::default()).await? {
        RunOutcome::Launched(report) => Ok(report),
        RunOutcome::Aborted => anyhow::bail!("silent run must not abort"),
    }
}

// ============================================================================
// Run Tests
// ============================================================================

#[tokio::test]
async fn test_silent_run_launches_every_task() -> Result<()> {
    let mut plan = mock_plan(3, Inputs::new())?;
    let mut console = ScriptedConsole::default();

    let outcome = plan.run(true, &mut console).await?;

    let RunOutcome::Launched(report) = outcome else {
        anyhow::bail!("expected launch");
    };
    assert!(report.is_complete());
    assert_eq!(console.questions_asked(), 0);

    let refs: HashSet<_> = plan.tasks().iter().filter_map(|t| t.execution_ref()).collect();
    assert_eq!(refs.len(), 3);

    let transcript = console.transcript();
    assert_eq!(transcript[0], "Preparing execution plan...");
    assert!(transcript.contains(&"Confirming execution plan...".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_declined_confirmation_launches_nothing() -> Result<()> {
    let mut plan = mock_plan(2, Inputs::new())?;
    let mut console = ScriptedConsole::new(["N"]);

    let outcome = plan.run(false, &mut console).await?;

    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(plan.tasks().iter().all(|t| !t.is_launched()));
    assert!(console
        .transcript()
        .contains(&"Execution was aborted by user.".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_launch_failure_stops_sequential_launch() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.fail_launch_of("t1");
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(3, &session));

    let err = plan.run(true, &mut ScriptedConsole::default()).await.unwrap_err();

    let ShuttleError::LaunchFailed { index, report, .. } = err else {
        anyhow::bail!("expected LaunchFailed");
    };
    assert_eq!(index, 1);
    assert!(matches!(report.entries[0], LaunchStatus::Launched(_)));
    assert!(matches!(report.entries[1], LaunchStatus::Failed(_)));
    assert_eq!(report.entries[2], LaunchStatus::Skipped);
    assert_eq!(report.running(), vec![0]);

    assert!(plan.tasks()[0].is_launched());
    assert!(!plan.tasks()[1].is_launched());
    assert!(!plan.tasks()[2].is_launched());
    assert_eq!(gateway.launches().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_launch_attempts_every_task() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.fail_launch_of("t1");
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(3, &session)).with_options(ExecutionOptions {
        concurrency: 3,
        show_progress: false,
    });

    let err = plan.run(true, &mut ScriptedConsole::default()).await.unwrap_err();

    let ShuttleError::LaunchFailed { report, .. } = err else {
        anyhow::bail!("expected LaunchFailed");
    };
    assert_eq!(report.running(), vec![0, 2]);
    assert_eq!(report.failed(), vec![1]);
    assert_eq!(gateway.launches().len(), 2);
    Ok(())
}

// ============================================================================
// Join Tests
// ============================================================================

#[tokio::test]
async fn test_join_requires_every_task_launched() -> Result<()> {
    let plan = mock_plan(2, Inputs::new())?;

    let err = plan.join(TICK).await.unwrap_err();

    assert!(matches!(err, ShuttleError::Precondition(_)));
    Ok(())
}

#[tokio::test]
async fn test_join_polls_every_task_until_all_terminal() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.script("t0", &["EXECUTING", "COMPLETED"]);
    gateway.script("t1", &["EXECUTING", "EXECUTING", "FAILED"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(2, &session));
    launch_silently(&mut plan).await?;

    let report = plan.join(TICK).await?;

    assert_eq!(report.polls, 3);
    assert_eq!(
        report.states,
        vec![ExecutionState::Completed, ExecutionState::Failed]
    );
    assert!(!report.all_succeeded());
    // Done tasks are still polled on every iteration
    assert_eq!(
        gateway.status_calls(),
        vec!["t0", "t1", "t0", "t1", "t0", "t1"]
    );
    Ok(())
}

#[tokio::test]
async fn test_done_is_sticky_across_regressions() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.script("t0", &["COMPLETED", "EXECUTING"]);
    gateway.script("t1", &["EXECUTING", "EXECUTING", "COMPLETED"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(2, &session));
    launch_silently(&mut plan).await?;

    let report = plan.join(TICK).await?;

    assert_eq!(report.polls, 3);
    assert_eq!(report.states[0], ExecutionState::Executing);
    assert_eq!(report.states[1], ExecutionState::Completed);
    Ok(())
}

#[tokio::test]
async fn test_mock_plan_runs_to_completion() -> Result<()> {
    let mut args = Inputs::new();
    args.insert("seed".into(), 99.into());
    let mut plan = mock_plan(4, args)?.with_options(ExecutionOptions {
        concurrency: 2,
        show_progress: false,
    });
    launch_silently(&mut plan).await?;

    let report = plan.join(TICK).await?;

    assert!(report.polls >= 1);
    assert!(report.all_succeeded());
    assert_eq!(report.states.len(), 4);
    Ok(())
}

// ============================================================================
// Stop And Collect Tests
// ============================================================================

#[tokio::test]
async fn test_stop_attempts_every_task() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.fail_cancel_of("t0");
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(3, &session));
    launch_silently(&mut plan).await?;

    let err = plan.stop().await.unwrap_err();

    assert!(matches!(err, ShuttleError::Gateway(_)));
    let signalled: Vec<String> = gateway.signals().into_iter().map(|(name, _)| name).collect();
    assert_eq!(signalled, vec!["t0", "t1", "t2"]);
    assert!(gateway.signals().iter().all(|(_, signal)| signal == "SIGTERM"));
    Ok(())
}

#[tokio::test]
async fn test_stop_after_partial_launch_signals_running_tasks() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.fail_launch_of("t1");
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(3, &session));
    let launch = plan.run(true, &mut ScriptedConsole::default()).await;
    assert!(matches!(launch, Err(ShuttleError::LaunchFailed { index: 1, .. })));

    let err = plan.stop().await.unwrap_err();

    assert!(matches!(err, ShuttleError::Precondition(_)));
    assert_eq!(gateway.signals(), vec![("t0".to_string(), "SIGTERM".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_statuses_after_partial_launch() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.fail_launch_of("t1");
    gateway.script("t0", &["EXECUTING"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(3, &session));
    let _ = plan.run(true, &mut ScriptedConsole::default()).await;

    let states = plan.statuses().await?;

    assert_eq!(states, vec![Some(ExecutionState::Executing), None, None]);
    assert_eq!(gateway.status_calls(), vec!["t0"]);
    assert!(matches!(
        plan.join(TICK).await,
        Err(ShuttleError::Precondition(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_collect_results_into_per_task_directories() -> Result<()> {
    let mut args = Inputs::new();
    args.insert(
        "outputs".into(),
        InputValue::List(vec!["out/log.txt".into(), "traj.dcd".into()]),
    );
    let mut plan = mock_plan(2, args)?;
    launch_silently(&mut plan).await?;
    let dest = TempDir::new()?;

    let files = plan.collect_results(dest.path()).await?;

    assert_eq!(files.len(), 2);
    assert_eq!(
        files[0],
        vec![dest.path().join("0-t0/out/log.txt"), dest.path().join("0-t0/traj.dcd")]
    );
    assert_eq!(files[1][0], dest.path().join("1-t1/out/log.txt"));
    assert!(files.iter().flatten().all(|p| p.exists()));
    Ok(())
}

#[tokio::test]
async fn test_same_file_name_in_different_directories_is_kept_apart() -> Result<()> {
    let mut args = Inputs::new();
    args.insert(
        "outputs".into(),
        InputValue::List(vec!["run1/log.txt".into(), "run2/log.txt".into()]),
    );
    let mut plan = mock_plan(1, args)?;
    launch_silently(&mut plan).await?;
    let dest = TempDir::new()?;

    let files = plan.collect_results(dest.path()).await?;

    assert_eq!(
        files[0],
        vec![dest.path().join("0-t0/run1/log.txt"), dest.path().join("0-t0/run2/log.txt")]
    );
    assert!(std::fs::read_to_string(&files[0][0])?.contains("run1/log.txt"));
    assert!(std::fs::read_to_string(&files[0][1])?.contains("run2/log.txt"));
    Ok(())
}

#[tokio::test]
async fn test_remote_results_keep_their_directories() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.set_outputs(&["a/out.log", "b/out.log"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(1, &session));
    launch_silently(&mut plan).await?;
    let dest = TempDir::new()?;

    let files = plan.collect_results(dest.path()).await?;

    assert_ne!(files[0][0], files[0][1]);
    assert_eq!(std::fs::read_to_string(&files[0][0])?, "a/out.log from t0");
    assert_eq!(std::fs::read_to_string(&files[0][1])?, "b/out.log from t0");
    Ok(())
}

#[tokio::test]
async fn test_collect_checks_every_task_before_downloading() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.set_outputs(&["result.txt"]);
    gateway.fail_launch_of("t1");
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(2, &session));
    let _ = plan.run(true, &mut ScriptedConsole::default()).await;
    let dest = TempDir::new()?;

    let err = plan.collect_results(&dest.path().join("out")).await.unwrap_err();

    assert!(matches!(err, ShuttleError::Precondition(_)));
    assert!(!dest.path().join("out").exists());
    Ok(())
}

#[tokio::test]
async fn test_remote_results_are_downloaded() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.set_outputs(&["remote/out.log"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(2, &session));
    launch_silently(&mut plan).await?;
    let dest = TempDir::new()?;

    let files = plan.collect_results(dest.path()).await?;

    let content = std::fs::read_to_string(&files[1][0])?;
    assert_eq!(content, "remote/out.log from t1");
    Ok(())
}

#[tokio::test]
async fn test_concurrent_collection_keeps_plan_order() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.set_outputs(&["out.log"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(5, &session)).with_options(ExecutionOptions {
        concurrency: 4,
        show_progress: false,
    });
    launch_silently(&mut plan).await?;
    let dest = TempDir::new()?;

    let files = plan.collect_results(dest.path()).await?;

    assert_eq!(files.len(), 5);
    for (index, paths) in files.iter().enumerate() {
        assert_eq!(paths[0], dest.path().join(format!("{}-t{}", index, index)).join("out.log"));
        assert_eq!(std::fs::read_to_string(&paths[0])?, format!("out.log from t{}", index));
    }
    Ok(())
}

// ============================================================================
// Scenario Tests
// ============================================================================

#[tokio::test]
async fn test_single_mock_task_completes_with_monotonic_counter() -> Result<()> {
    let runtime = Arc::new(Runtime::mock_seeded(8));
    let mut task = Task::new("solo", "echo", Inputs::new(), runtime.clone());
    task.launch().await?;

    let Runtime::Mock(mock) = runtime.as_ref() else {
        anyhow::bail!("expected mock runtime");
    };
    let mut last = mock.progress().await;
    loop {
        let state = task.status().await?;
        let counter = mock.progress().await;
        assert!(counter >= last);
        last = counter;
        if state.is_terminal() {
            assert_eq!(state, ExecutionState::Completed);
            break;
        }
    }

    // A fresh runtime so join has to drive the counter past the threshold
    let fresh = Arc::new(Runtime::mock_seeded(8));
    let mut plan = Plan::new(vec![Task::new("solo", "echo", Inputs::new(), fresh.clone())]);
    launch_silently(&mut plan).await?;
    let report = plan.join(Duration::ZERO).await?;

    let Runtime::Mock(mock) = fresh.as_ref() else {
        anyhow::bail!("expected mock runtime");
    };
    assert_eq!(report.states, vec![ExecutionState::Completed]);
    // Each poll adds at most max_step, so crossing the threshold takes several polls
    assert!(report.polls >= 3, "join finished after {} poll(s)", report.polls);
    assert!(mock.progress().await > mock.threshold());
    Ok(())
}

#[tokio::test]
async fn test_declined_remote_plan_never_reaches_gateway() -> Result<()> {
    let gateway = FakeGateway::new();
    let session = logged_in_session(gateway.clone());
    let mut plan = Plan::new(remote_tasks(3, &session));
    let mut console = ScriptedConsole::new(["no"]);

    let outcome = plan.run(false, &mut console).await?;

    assert_eq!(outcome, RunOutcome::Aborted);
    assert!(!plan.is_launched());
    assert!(gateway.launches().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_double_launch_calls_backend_once() -> Result<()> {
    let gateway = FakeGateway::new();
    let session = logged_in_session(gateway.clone());
    let mut task = remote_tasks(1, &session).remove(0);

    task.launch().await?;
    let err = task.launch().await.unwrap_err();

    assert!(matches!(err, ShuttleError::Precondition(_)));
    assert_eq!(gateway.launches().len(), 1);
    Ok(())
}
