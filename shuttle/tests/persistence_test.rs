//! Integration tests for saving and reloading plans

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use shuttle::{
    InputValue, Inputs, Plan, RunOutcome, Runtime, RuntimeKind, ScriptedConsole, Session,
    ShuttleError, Task,
};
use tempfile::TempDir;

use common::{logged_in_session, FakeGateway};

fn sample_plan(session: &Session) -> Plan {
    let mut args = Inputs::new();
    args.insert("seed".into(), 5.into());
    args.insert("threshold".into(), 3.into());
    let mock = Arc::new(Runtime::from_spec(
        shuttle::RuntimeSpec::new(RuntimeKind::Mock, args),
        session,
    ).expect("valid mock args"));

    let mut remote_args = Inputs::new();
    remote_args.insert("cluster".into(), "expanse".into());
    let remote = Arc::new(Runtime::remote(remote_args, session));

    let mut inputs = Inputs::new();
    inputs.insert("pdb_file".into(), InputValue::file("inputs/water.pdb"));
    inputs.insert("steps".into(), 500.into());
    inputs.insert("temperature".into(), 310.5.into());

    Plan::new(vec![
        Task::new("md-0", "namd", inputs.clone(), mock.clone()),
        Task::new("md-1", "namd", inputs.clone(), mock),
        Task::new("md-2", "namd", inputs, remote),
    ])
}

#[test]
fn test_round_trip_preserves_specs() -> Result<()> {
    let session = Session::anonymous();
    let plan = sample_plan(&session);
    let tmp = TempDir::new()?;

    for file in ["plan.json", "plan.yaml"] {
        let path = tmp.path().join(file);
        plan.save(&path)?;
        let loaded = Plan::load(&path, &session)?;

        assert_eq!(loaded.specs(), plan.specs(), "round trip through {}", file);
        assert!(Arc::ptr_eq(loaded.tasks()[0].runtime(), loaded.tasks()[1].runtime()));
        assert_eq!(loaded.tasks()[2].runtime().kind(), RuntimeKind::Remote);
    }
    Ok(())
}

#[test]
fn test_round_trip_keeps_full_range_mock_seed() -> Result<()> {
    let session = Session::anonymous();
    let runtime = Arc::new(Runtime::mock_seeded(u64::MAX));
    let plan = Plan::new(vec![Task::new("t0", "echo", Inputs::new(), runtime)]);
    let tmp = TempDir::new()?;

    for file in ["plan.json", "plan.yaml"] {
        let path = tmp.path().join(file);
        plan.save(&path)?;
        let loaded = Plan::load(&path, &session)?;
        assert_eq!(loaded.specs(), plan.specs(), "round trip through {}", file);
    }
    Ok(())
}

#[test]
fn test_saved_json_layout() -> Result<()> {
    let plan = sample_plan(&Session::anonymous());
    let tmp = TempDir::new()?;
    let path = tmp.path().join("plan.json");
    plan.save(&path)?;

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let task = &value["tasks"][2];
    assert_eq!(task["name"], "md-2");
    assert_eq!(task["app_id"], "namd");
    assert_eq!(task["inputs"]["pdb_file"]["file"], "inputs/water.pdb");
    assert_eq!(task["runtime"]["kind"], "remote");
    assert_eq!(task["runtime"]["args"]["cluster"], "expanse");
    assert!(task.get("execution_ref").is_none());
    Ok(())
}

#[tokio::test]
async fn test_references_survive_reload() -> Result<()> {
    let gateway = FakeGateway::new();
    gateway.script("md-2", &["EXECUTING", "COMPLETED"]);
    let session = logged_in_session(gateway.clone());
    let mut plan = sample_plan(&session);
    let tmp = TempDir::new()?;
    let path = tmp.path().join("plan.json");

    let outcome = plan.run(true, &mut ScriptedConsole::default()).await?;
    assert!(matches!(outcome, RunOutcome::Launched(_)));
    plan.save(&path)?;

    let reloaded = Plan::load(&path, &session)?;
    assert_eq!(reloaded.specs(), plan.specs());
    assert!(reloaded.tasks().iter().all(Task::is_launched));
    assert_eq!(
        reloaded.tasks()[2].execution_ref().map(|r| r.as_str()),
        Some("exp-1")
    );

    let report = reloaded.join(Duration::from_millis(1)).await?;
    assert!(report.all_succeeded());
    Ok(())
}

#[tokio::test]
async fn test_reloaded_remote_task_needs_credential() -> Result<()> {
    let gateway = FakeGateway::new();
    let mut plan = sample_plan(&logged_in_session(gateway.clone()));
    plan.run(true, &mut ScriptedConsole::default()).await?;
    let tmp = TempDir::new()?;
    let path = tmp.path().join("plan.yml");
    plan.save(&path)?;

    let anonymous = Session::anonymous().with_gateway(gateway);
    let reloaded = Plan::load(&path, &anonymous)?;

    let err = reloaded.tasks()[2].status().await.unwrap_err();
    assert!(matches!(err, ShuttleError::MissingCredential(_)));
    assert!(reloaded.tasks()[0].status().await.is_ok());
    Ok(())
}

#[test]
fn test_missing_plan_file() {
    let tmp = TempDir::new().unwrap();
    let err = Plan::load(&tmp.path().join("absent.json"), &Session::anonymous()).unwrap_err();
    assert!(matches!(err, ShuttleError::Io(_)));
}

#[test]
fn test_malformed_plan_file() -> Result<()> {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("plan.json");
    std::fs::write(&path, r#"{"tasks": [{"name": "x"}]}"#)?;

    let err = Plan::load(&path, &Session::anonymous()).unwrap_err();
    assert!(matches!(err, ShuttleError::Json(_)));
    Ok(())
}
