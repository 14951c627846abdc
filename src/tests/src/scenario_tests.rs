use crate::fakes::{
    call, commands_payload, drain, reply, session, RecordingGate, ScriptedModel, ScriptedRunner,
    StubTools,
};
use application::ExecutionOutcome;
use domain::events::EngineEvent;
use domain::models::Role;
use domain::services::CommandRunner;
use domain::CommandStatus;
use infrastructure::{OutputMode, ShellExecutor, ToolRegistry};
use shared::{AbortSignal, Error};
use std::fs;
use std::sync::Arc;

fn statuses(events: &[EngineEvent]) -> Vec<(usize, String, CommandStatus)> {
    events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::StatusChanged { index, cmd, status } => Some((*index, cmd.clone(), *status)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn list_files_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("report.csv"), "a,b\n").unwrap();
    let executor = ShellExecutor::new(dir.path().canonicalize().unwrap(), "/bin/sh")
        .with_output(OutputMode::Capture);

    let model = Arc::new(
        ScriptedModel::new()
            .replies(vec![
                reply("", vec![call("call_1", "get_ls_output", "{}")]),
                reply("Lists files in the current directory.", vec![]),
            ])
            .explanation(&["Lists files ", "in the current directory."])
            .payload(Ok(commands_payload(&[("ls -la", false)]))),
    );
    let gate = Arc::new(RecordingGate::approving());
    let (mut session, mut events) = session(
        model.clone(),
        Arc::new(ToolRegistry::default()),
        Box::new(executor),
        gate.clone(),
        AbortSignal::new(),
    );

    let outcome = session.run("list files here").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Completed);

    let tool_result = session
        .conversation()
        .messages()
        .iter()
        .find(|m| m.role == Role::ToolResult)
        .cloned()
        .unwrap();
    assert_eq!(tool_result.name.as_deref(), Some("get_ls_output"));
    assert!(tool_result.content.contains("report.csv"));
    drop(session);

    let events = drain(&mut events);
    assert!(events.contains(&EngineEvent::ExplanationComplete(
        "Lists files in the current directory.".into()
    )));
    assert_eq!(
        statuses(&events),
        vec![
            (0, "ls -la".to_string(), CommandStatus::Running),
            (0, "ls -la".to_string(), CommandStatus::Success),
        ]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::CommandOutput { stdout, .. } if stdout.contains("report.csv")
    )));
    assert_eq!(gate.times_shown(), 1);
    assert_eq!(model.respond_requests().len(), 2);
}

#[tokio::test]
async fn failed_command_is_replaced_by_recovery_plan() {
    let (runner, ran) = ScriptedRunner::recording();
    let runner = runner.failing(&["rm -rf /tmp/x"]);
    let model = Arc::new(
        ScriptedModel::new()
            .payload(Ok(commands_payload(&[("rm -rf /tmp/x", true)])))
            .payload(Ok(commands_payload(&[("rm -rf /tmp/y", true)]))),
    );
    let gate = Arc::new(RecordingGate::approving());
    let (mut session, mut events) = session(
        model.clone(),
        Arc::new(StubTools::default()),
        Box::new(runner),
        gate.clone(),
        AbortSignal::new(),
    );

    let outcome = session.run("remove the temp dir").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Completed);
    drop(session);

    assert_eq!(*ran.lock().unwrap(), vec!["rm -rf /tmp/x", "rm -rf /tmp/y"]);
    let events = drain(&mut events);
    let finals: Vec<_> = statuses(&events)
        .into_iter()
        .filter(|(_, _, status)| status.is_final())
        .map(|(_, cmd, status)| (cmd, status))
        .collect();
    assert_eq!(
        finals,
        vec![
            ("rm -rf /tmp/x".to_string(), CommandStatus::Error),
            ("rm -rf /tmp/y".to_string(), CommandStatus::Success),
        ]
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::RecoveryStarted { attempt: 1, .. })));
    assert_eq!(gate.times_shown(), 2);
    assert!(gate.shown.lock().unwrap()[1][0].command.dangerous);
}

#[tokio::test]
async fn abort_mid_list_leaves_finished_commands_alone() {
    let abort = AbortSignal::new();
    let (runner, ran) = ScriptedRunner::recording();
    let runner = runner.abort_on("step 2", abort.clone());
    let model = Arc::new(ScriptedModel::new().payload(Ok(commands_payload(&[
        ("step 1", false),
        ("step 2", false),
        ("step 3", false),
        ("step 4", false),
    ]))));
    let (mut session, mut events) = session(
        model.clone(),
        Arc::new(StubTools::default()),
        Box::new(runner),
        Arc::new(RecordingGate::approving()),
        abort,
    );

    let outcome = session.run("four steps").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Aborted);
    drop(session);

    assert_eq!(*ran.lock().unwrap(), vec!["step 1", "step 2"]);
    let events = drain(&mut events);
    let finals: Vec<_> = statuses(&events)
        .into_iter()
        .filter(|(_, _, status)| status.is_final())
        .map(|(index, _, status)| (index, status))
        .collect();
    assert_eq!(
        finals,
        vec![
            (0, CommandStatus::Success),
            (1, CommandStatus::Aborted),
            (2, CommandStatus::Aborted),
            (3, CommandStatus::Aborted),
        ]
    );
    let running: Vec<usize> = statuses(&events)
        .into_iter()
        .filter(|(_, _, status)| *status == CommandStatus::Running)
        .map(|(index, _, _)| index)
        .collect();
    assert_eq!(running, vec![0, 1]);
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::RecoveryStarted { .. })));
    assert_eq!(model.structured_calls(), 1);
}

#[tokio::test]
async fn abort_while_a_command_fails_skips_recovery() {
    let abort = AbortSignal::new();
    let (runner, ran) = ScriptedRunner::recording();
    let runner = runner.failing(&["step 2"]).abort_on("step 2", abort.clone());
    let model = Arc::new(ScriptedModel::new().payload(Ok(commands_payload(&[
        ("step 1", false),
        ("step 2", false),
        ("step 3", false),
    ]))));
    let (mut session, mut events) = session(
        model.clone(),
        Arc::new(StubTools::default()),
        Box::new(runner),
        Arc::new(RecordingGate::approving()),
        abort,
    );

    let outcome = session.run("three steps").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Aborted);
    drop(session);

    assert_eq!(*ran.lock().unwrap(), vec!["step 1", "step 2"]);
    assert_eq!(model.structured_calls(), 1);
    let events = drain(&mut events);
    let finals: Vec<_> = statuses(&events)
        .into_iter()
        .filter(|(_, _, status)| status.is_final())
        .map(|(index, _, status)| (index, status))
        .collect();
    assert_eq!(
        finals,
        vec![
            (0, CommandStatus::Success),
            (1, CommandStatus::Aborted),
            (2, CommandStatus::Aborted),
        ]
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::RecoveryStarted { .. })));
}

#[tokio::test]
async fn abort_during_recovery_context_ends_aborted() {
    let abort = AbortSignal::new();
    let (runner, ran) = ScriptedRunner::recording();
    let runner = runner.failing(&["make"]);
    let model = Arc::new(
        ScriptedModel::new()
            .replies(vec![
                reply("Ready.", vec![]),
                reply("", vec![call("1", "get_ls_output", "{}")]),
                reply("Should never be asked.", vec![]),
            ])
            .payload(Ok(commands_payload(&[("make", false)])))
            .payload(Ok(commands_payload(&[("make all", false)])))
            .abort_at_request(2, abort.clone()),
    );
    let (mut session, mut events) = session(
        model.clone(),
        Arc::new(StubTools::default()),
        Box::new(runner),
        Arc::new(RecordingGate::approving()),
        abort,
    );

    let outcome = session.run("build it").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Aborted);
    drop(session);

    assert_eq!(*ran.lock().unwrap(), vec!["make"]);
    assert_eq!(model.respond_requests().len(), 2);
    assert_eq!(model.structured_calls(), 1);
    let events = drain(&mut events);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::RecoveryStarted { .. }))
            .count(),
        1
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, EngineEvent::GenerationFailed(_))));
}

#[tokio::test]
async fn declined_recovery_plan_runs_nothing_more() {
    let (runner, ran) = ScriptedRunner::recording();
    let runner = runner.failing(&["make"]);
    let model = Arc::new(
        ScriptedModel::new()
            .payload(Ok(commands_payload(&[("make", false), ("make install", false)])))
            .payload(Ok(commands_payload(&[("make clean && make", true)]))),
    );
    let gate = Arc::new(RecordingGate::answering(&[true, false], true));
    let (mut session, _events) = session(
        model.clone(),
        Arc::new(StubTools::default()),
        Box::new(runner),
        gate.clone(),
        AbortSignal::new(),
    );

    let outcome = session.run("build and install").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Declined);
    assert_eq!(*ran.lock().unwrap(), vec!["make"]);
    assert_eq!(gate.times_shown(), 2);
    assert_eq!(gate.shown.lock().unwrap()[1][0].command.cmd, "make clean && make");
    assert_eq!(model.structured_calls(), 2);
}

#[tokio::test]
async fn export_is_rejected_before_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let mut executor = ShellExecutor::new(dir.path().canonicalize().unwrap(), "/bin/sh");

    let result = executor.run("export FOO=bar; touch spawned").await;
    assert!(matches!(result, Err(Error::UnsupportedCommand(ref cmd)) if cmd.starts_with("export FOO=bar")));
    assert!(!dir.path().join("spawned").exists());
}

#[tokio::test]
async fn unsupported_command_enters_recovery() {
    let dir = tempfile::tempdir().unwrap();
    let executor = ShellExecutor::new(dir.path().canonicalize().unwrap(), "/bin/sh");
    let model = Arc::new(
        ScriptedModel::new()
            .payload(Ok(commands_payload(&[("export FOO=bar", false)])))
            .payload(Ok(commands_payload(&[]))),
    );
    let (mut session, mut events) = session(
        model,
        Arc::new(StubTools::default()),
        Box::new(executor),
        Arc::new(RecordingGate::approving()),
        AbortSignal::new(),
    );

    let outcome = session.run("set FOO").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::RecoveryStopped);
    drop(session);

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::RecoveryStarted { error, .. } if error.contains("export FOO=bar")
    )));
}

#[tokio::test]
async fn declined_plan_runs_nothing() {
    let (runner, ran) = ScriptedRunner::recording();
    let model = Arc::new(ScriptedModel::new().payload(Ok(commands_payload(&[("rm -rf build", true)]))));
    let (mut session, _events) = session(
        model,
        Arc::new(StubTools::default()),
        Box::new(runner),
        Arc::new(RecordingGate::declining()),
        AbortSignal::new(),
    );

    let outcome = session.run("clean").await.unwrap();
    assert_eq!(outcome, ExecutionOutcome::Declined);
    assert!(ran.lock().unwrap().is_empty());
}
