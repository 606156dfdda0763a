use passflow::flows::{DEFAULT_AUTHENTICATION, DEFAULT_RECOVERY};
use passflow::{AppConfig, Passflow};
use passflow_core::services::UserDirectory;
use passflow_core::{FlowError, FlowOutcome, FlowRequest, FlowStatus, StageInput, User};

fn last_code(app: &Passflow) -> String {
    let sent = app.notifications.sent();
    let body = &sent.last().expect("email sent").body;
    body.split("code is ").nth(1)
        .and_then(|rest| rest.split('.').next())
        .expect("code in body")
        .to_string()
}

fn retry_message(outcome: &FlowOutcome) -> &str {
    match outcome {
        FlowOutcome::Retry { error: FlowError::RetriableStage { message, .. }, .. } => message,
        other => panic!("expected retry, got {other:?}"),
    }
}

#[test]
fn recovery_resets_the_password_and_logs_in() {
    let app = Passflow::in_memory(&AppConfig { bcrypt_cost: 4,
                                               ..AppConfig::default() });
    let alice = app.users
                   .insert_with_password(User::new("alice", "alice@example.com"), "Old-Passw0rd")
                   .expect("seed");

    let resp = app.start("r", DEFAULT_RECOVERY, FlowRequest::new()).expect("start");
    let resp = app.submit("r", resp.version, StageInput::new().with("uid_field", "alice")).expect("identify");
    assert_eq!(resp.prompt().map(|p| p.stage_id.as_str()), Some("default-recovery-email"));
    assert_eq!(app.notifications.sent().last().map(|n| n.to.as_str()), Some("alice@example.com"));

    let wrong = app.submit("r", resp.version, StageInput::new().with("token", "nope")).expect("wrong");
    assert_eq!(retry_message(&wrong.outcome), "Invalid verification code.");

    let resp = app.submit("r", wrong.version, StageInput::new().with("token", last_code(&app)))
                  .expect("verify");
    assert_eq!(resp.prompt().map(|p| p.stage_id.as_str()), Some("default-recovery-password"));

    let mismatch = app.submit("r",
                              resp.version,
                              StageInput::new().with("password", "N3w-Passw0rd")
                                               .with("password_repeat", "N3w-Passw0rX"))
                      .expect("mismatch");
    assert_eq!(retry_message(&mismatch.outcome), "Passwords don't match.");

    let done = app.submit("r",
                          mismatch.version,
                          StageInput::new().with("password", "N3w-Passw0rd")
                                           .with("password_repeat", "N3w-Passw0rd"))
                  .expect("reset");
    assert_eq!(done.status, FlowStatus::Completed);
    assert!(done.completed().and_then(|c| c.session.as_ref()).is_some());

    let stored = app.users.get(alice.id).expect("get").expect("user");
    assert!(app.users.check_password(&stored, "N3w-Passw0rd").expect("check"));
    assert!(!app.users.check_password(&stored, "Old-Passw0rd").expect("check"));

    // el login normal acepta la contraseña nueva
    let resp = app.start("login", DEFAULT_AUTHENTICATION, FlowRequest::new()).expect("start");
    let resp = app.submit("login", resp.version, StageInput::new().with("uid_field", "alice")).expect("identify");
    let done = app.submit("login", resp.version, StageInput::new().with("password", "N3w-Passw0rd"))
                  .expect("password");
    assert_eq!(done.status, FlowStatus::Completed);
}
