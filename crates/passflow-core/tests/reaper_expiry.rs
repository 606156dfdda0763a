use std::sync::Arc;

use chrono::{Duration, Utc};
use passflow_core::store::{InMemorySessionStore, SessionStore};
use passflow_core::{EventStore, ExecutorConfig, FlowDefinition, FlowDesignation, FlowError, FlowEventKind, FlowExecutor,
                    FlowRequest, FlowStatus, InMemoryEventStore, Stage, StageInput, StageKind};

fn config() -> ExecutorConfig {
    ExecutorConfig { session_idle_timeout_secs: 60,
                     terminal_retention_secs: 3600,
                     ..ExecutorConfig::default() }
}

fn flow() -> FlowDefinition {
    FlowDefinition::new("wait", FlowDesignation::Authentication).stage(Stage::new("hold", StageKind::Dummy))
}

#[test]
fn idle_suspended_flow_expires_and_rejects_dispatch() {
    let sessions = Arc::new(InMemorySessionStore::new());
    let events = Arc::new(InMemoryEventStore::new());
    let executor = FlowExecutor::builder().sessions(sessions.clone())
                                          .events(events.clone())
                                          .config(config())
                                          .build();
    let resp = executor.start("s", &flow(), FlowRequest::new()).expect("start");

    // todavía dentro de la ventana de inactividad
    let report = executor.reaper().run_at(Utc::now()).expect("reap");
    assert_eq!(report.expired, 0);

    let report = executor.reaper().run_at(Utc::now() + Duration::seconds(120)).expect("reap");
    assert_eq!(report.expired, 1);

    let snapshot = sessions.load("s").expect("load").expect("snapshot");
    assert_eq!(snapshot.state.status, FlowStatus::Expired);
    assert!(snapshot.plan.context.is_empty());
    assert!(events.list(resp.flow_instance)
                  .expect("events")
                  .iter()
                  .any(|e| matches!(e.kind, FlowEventKind::FlowExpired { .. })));

    let err = executor.dispatch_current_stage("s", snapshot.state.version, Some(StageInput::new()))
                      .unwrap_err();
    assert_eq!(err, FlowError::ExpiredFlow);
}

#[test]
fn old_terminal_snapshots_are_purged() {
    let sessions = Arc::new(InMemorySessionStore::new());
    let executor = FlowExecutor::builder().sessions(sessions.clone()).config(config()).build();
    let resp = executor.start("s", &flow(), FlowRequest::new()).expect("start");
    executor.cancel("s", resp.version, "bye").expect("cancel");
    executor.start("live", &flow(), FlowRequest::new()).expect("start");

    let report = executor.reaper().run_at(Utc::now() + Duration::seconds(7200)).expect("reap");
    assert_eq!(report.purged, 1);
    assert!(sessions.load("s").expect("load").is_none());
    // el flow vivo se expira en esta misma pasada, pero sigue presente
    assert_eq!(report.expired, 1);
    assert!(sessions.load("live").expect("load").is_some());
}
