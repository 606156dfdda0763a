mod test_support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use passflow_core::store::SessionStore;
use passflow_core::{EventStore, FlowDefinition, FlowDesignation, FlowExecutor, FlowRequest, FlowStatus, Stage, StageInput,
                    StageKind, StoreError};
use passflow_persistence::{PgEventStore, PgSessionStore, PoolProvider};
use test_support::{unique_key, with_pool};

fn two_dummies() -> FlowDefinition {
    FlowDefinition::new("pg-dummies", FlowDesignation::Authentication).stage(Stage::new("a", StageKind::Dummy))
                                                                         .stage(Stage::new("b", StageKind::Dummy))
}

#[test]
fn executor_round_trips_through_postgres() {
    let Some(pool) = with_pool(|p| p.clone()) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let sessions = Arc::new(PgSessionStore::new(PoolProvider::new(pool.clone())));
    let executor = FlowExecutor::builder().sessions(sessions.clone())
                                          .events(Arc::new(PgEventStore::new(PoolProvider::new(pool))))
                                          .build();
    let key = unique_key("roundtrip");

    let resp = executor.start(&key, &two_dummies(), FlowRequest::new()).expect("start");
    let resp = executor.dispatch_current_stage(&key, resp.version, Some(StageInput::new()))
                       .expect("a");
    let stored = sessions.load(&key).expect("load").expect("snapshot");
    assert_eq!(stored.state.index, 1);
    assert_eq!(stored.state.version, resp.version);

    let done = executor.dispatch_current_stage(&key, resp.version, Some(StageInput::new()))
                       .expect("b");
    assert_eq!(done.status, FlowStatus::Completed);
    let kinds: Vec<_> = executor.events()
                                .list(done.flow_instance)
                                .expect("events")
                                .into_iter()
                                .map(|e| e.kind.name())
                                .collect();
    assert_eq!(kinds.first(), Some(&"flow_started"));
    assert_eq!(kinds.last(), Some(&"flow_completed"));
    assert!(sessions.delete(&key).expect("delete"));
}

#[test]
fn stale_save_is_a_version_conflict() {
    let Some(pool) = with_pool(|p| p.clone()) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let sessions = Arc::new(PgSessionStore::new(PoolProvider::new(pool)));
    let executor = FlowExecutor::builder().sessions(sessions.clone()).build();
    let key = unique_key("stale");
    let resp = executor.start(&key, &two_dummies(), FlowRequest::new()).expect("start");

    let snapshot = sessions.load(&key).expect("load").expect("snapshot");
    let mut newer = snapshot.clone();
    newer.state.version += 1;
    sessions.save(&newer, Some(resp.version)).expect("cas");

    let err = sessions.save(&newer, Some(resp.version)).unwrap_err();
    assert_eq!(err,
               StoreError::VersionConflict { expected: Some(resp.version),
                                             found: resp.version + 1 });
    assert!(matches!(sessions.save(&newer, None), Err(StoreError::VersionConflict { .. })));
    sessions.delete(&key).expect("cleanup");
    assert_eq!(sessions.save(&newer, Some(1)).unwrap_err(), StoreError::NotFound);
}

#[test]
fn idle_listing_and_terminal_purge() {
    let Some(pool) = with_pool(|p| p.clone()) else {
        eprintln!("skip (no DATABASE_URL)");
        return;
    };
    let sessions = Arc::new(PgSessionStore::new(PoolProvider::new(pool)));
    let executor = FlowExecutor::builder().sessions(sessions.clone()).build();
    let key = unique_key("idle");
    executor.start(&key, &two_dummies(), FlowRequest::new()).expect("start");

    let future = Utc::now() + Duration::minutes(1);
    let idle = sessions.list_idle(FlowStatus::SuspendedWaitingInput, future).expect("idle");
    assert!(idle.iter().any(|s| s.state.session_key == key));

    let mut snapshot = sessions.load(&key).expect("load").expect("snapshot");
    let expected = snapshot.state.version;
    snapshot.state.status = FlowStatus::Cancelled;
    snapshot.state.version += 1;
    sessions.save(&snapshot, Some(expected)).expect("terminal");
    assert!(sessions.purge_terminal(future).expect("purge") >= 1);
    assert!(sessions.load(&key).expect("load").is_none());
}
