use std::sync::Arc;

use passflow_core::store::{FlowSnapshot, InMemorySessionStore, SessionStore};
use passflow_core::{ContextValue, EventStore, FlowDefinition, FlowDesignation, FlowError, FlowEventKind, FlowExecutor,
                    FlowOutcome, FlowRequest, FlowStatus, InMemoryEventStore, Stage, StageInput, StageKind};

fn dummies(slug: &str, n: usize) -> FlowDefinition {
    (0..n).fold(FlowDefinition::new(slug, FlowDesignation::Authentication), |flow, i| {
              flow.stage(Stage::new(format!("s{i}"), StageKind::Dummy))
          })
}

#[test]
fn empty_plan_completes_without_dispatch() {
    let events = Arc::new(InMemoryEventStore::new());
    let executor = FlowExecutor::builder().events(events.clone()).build();

    let resp = executor.start("sess", &dummies("empty", 0), FlowRequest::new()).expect("start");
    assert_eq!(resp.status, FlowStatus::Completed);
    assert!(resp.completed().is_some());

    let kinds: Vec<_> = events.list(resp.flow_instance).expect("events").into_iter().map(|e| e.kind.name()).collect();
    assert_eq!(kinds, vec!["flow_started", "flow_completed"]);
}

#[test]
fn dummy_stages_advance_in_configured_order() {
    let events = Arc::new(InMemoryEventStore::new());
    let executor = FlowExecutor::builder().events(events.clone()).build();
    let flow = dummies("three", 3);

    let mut resp = executor.start("sess", &flow, FlowRequest::new()).expect("start");
    let mut seen = Vec::new();
    while let FlowOutcome::Prompt(prompt) = &resp.outcome {
        seen.push(prompt.stage_id.clone());
        resp = executor.dispatch_current_stage("sess", resp.version, Some(StageInput::new()))
                       .expect("dispatch");
    }
    assert_eq!(seen, vec!["s0", "s1", "s2"]);
    assert_eq!(resp.status, FlowStatus::Completed);

    let advanced: Vec<String> = events.list(resp.flow_instance)
                                      .expect("events")
                                      .into_iter()
                                      .filter_map(|e| match e.kind {
                                          FlowEventKind::StageAdvanced { stage_id, .. } => Some(stage_id),
                                          _ => None,
                                      })
                                      .collect();
    assert_eq!(advanced, seen);
}

#[test]
fn stale_version_is_rejected_without_running_the_stage() {
    let executor = FlowExecutor::builder().build();
    let resp = executor.start("sess", &dummies("two", 2), FlowRequest::new()).expect("start");
    let next = executor.dispatch_current_stage("sess", resp.version, Some(StageInput::new()))
                       .expect("dispatch");

    let err = executor.dispatch_current_stage("sess", resp.version, Some(StageInput::new()))
                      .unwrap_err();
    assert_eq!(err,
               FlowError::StaleState { expected: resp.version,
                                       found: next.version });
    let current = executor.current("sess").expect("load").expect("snapshot");
    assert_eq!(current.state.index, 1);
}

#[test]
fn finished_flows_reject_further_dispatch() {
    let executor = FlowExecutor::builder().build();
    let resp = executor.start("sess", &dummies("one", 1), FlowRequest::new()).expect("start");
    let done = executor.dispatch_current_stage("sess", resp.version, Some(StageInput::new()))
                       .expect("dispatch");
    assert_eq!(done.status, FlowStatus::Completed);

    let err = executor.dispatch_current_stage("sess", done.version, None).unwrap_err();
    assert_eq!(err, FlowError::FlowFinished(FlowStatus::Completed));
    assert_eq!(executor.dispatch_current_stage("other", 1, None).unwrap_err(), FlowError::NoActiveFlow);
}

#[test]
fn cancel_releases_context() {
    let executor = FlowExecutor::builder().build();
    let request = FlowRequest::new().with_context("note", ContextValue::Str("keep me".into()));
    let resp = executor.start("sess", &dummies("one", 1), request).expect("start");

    let cancelled = executor.cancel("sess", resp.version, "user went away").expect("cancel");
    assert_eq!(cancelled.status, FlowStatus::Cancelled);
    assert_eq!(cancelled.outcome,
               FlowOutcome::Cancelled { reason: "user went away".into() });
    let snapshot = executor.current("sess").expect("load").expect("snapshot");
    assert!(snapshot.plan.context.is_empty());
}

#[test]
fn restarting_a_session_replaces_the_flow_and_keeps_versions_monotonic() {
    let executor = FlowExecutor::builder().build();
    let first = executor.start("sess", &dummies("a", 1), FlowRequest::new()).expect("start");
    let second = executor.start("sess", &dummies("b", 1), FlowRequest::new()).expect("restart");
    assert!(second.version > first.version);
    assert_ne!(first.flow_instance, second.flow_instance);
    assert_eq!(executor.current("sess").expect("load").expect("snapshot").state.flow_slug, "b");
}

#[test]
fn suspended_snapshot_resumes_in_a_new_executor() {
    let sessions = Arc::new(InMemorySessionStore::new());
    let first = FlowExecutor::builder().sessions(sessions.clone()).build();
    let resp = first.start("sess", &dummies("two", 2), FlowRequest::new()).expect("start");
    let resp = first.dispatch_current_stage("sess", resp.version, Some(StageInput::new()))
                    .expect("dispatch");

    // persistir como JSON y rehidratar en otro store, como tras un reinicio
    let json = sessions.load("sess").expect("load").expect("snapshot").to_json().expect("json");
    let restored = Arc::new(InMemorySessionStore::new());
    let snapshot = FlowSnapshot::from_json(json).expect("decode");
    restored.save(&snapshot, None).expect("seed");

    let second = FlowExecutor::builder().sessions(restored).build();
    let done = second.dispatch_current_stage("sess", resp.version, Some(StageInput::new()))
                     .expect("resume");
    assert_eq!(done.status, FlowStatus::Completed);
}
