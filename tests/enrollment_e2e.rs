use passflow::flows::DEFAULT_ENROLLMENT;
use passflow::{AppConfig, Passflow};
use passflow_core::constants::CTX_INVITATION;
use passflow_core::services::UserDirectory;
use passflow_core::{ContextValue, FlowError, FlowOutcome, FlowRequest, FlowStatus, StageInput, UserField};
use serde_json::json;

fn app() -> Passflow {
    Passflow::in_memory(&AppConfig { bcrypt_cost: 4,
                                     ..AppConfig::default() })
}

/// Extrae el código del último email enviado.
fn last_code(app: &Passflow) -> String {
    let sent = app.notifications.sent();
    let body = &sent.last().expect("email sent").body;
    body.split("code is ").nth(1)
        .and_then(|rest| rest.split('.').next())
        .expect("code in body")
        .to_string()
}

fn account(username: &str, password: &str, repeat: &str) -> StageInput {
    StageInput::new().with("username", username)
                     .with("email", format!("{username}@example.com"))
                     .with("password", password)
                     .with("password_repeat", repeat)
}

#[test]
fn invited_user_enrolls_verifies_email_and_is_logged_in() {
    let app = app();
    let token = app.invitations.create(json!({ "name": "Carol Invited" }), None);
    let request = FlowRequest::new().with_context(CTX_INVITATION, ContextValue::Str(token.clone()));

    let resp = app.start("signup", DEFAULT_ENROLLMENT, request).expect("start");
    assert_eq!(resp.prompt().map(|p| p.stage_id.as_str()), Some("default-enrollment-prompt"));

    let weak = app.submit("signup", resp.version, account("carol", "weak", "weak")).expect("weak");
    match &weak.outcome {
        FlowOutcome::Retry { error: FlowError::RetriableStage { message, .. }, .. } => {
            assert!(message.contains("at least 8 characters"), "{message}")
        }
        other => panic!("expected complexity retry, got {other:?}"),
    }

    let resp = app.submit("signup", weak.version, account("carol", "Sup3rSecret", "Sup3rSecret"))
                  .expect("account");
    assert_eq!(resp.prompt().map(|p| p.stage_id.as_str()), Some("default-enrollment-email"));
    let carol = app.users
                   .find_by_field(UserField::Username, "carol", false)
                   .expect("lookup")
                   .expect("user written");
    assert_eq!(carol.name, "Carol Invited");
    assert!(app.users.check_password(&carol, "Sup3rSecret").expect("check"));

    let snapshot = app.executor().current("signup").expect("load").expect("snapshot");
    assert!(snapshot.plan.context.get("password").is_none(), "password purged after user write");

    let wrong = app.submit("signup", resp.version, StageInput::new().with("token", "0000")).expect("wrong");
    assert!(matches!(wrong.outcome, FlowOutcome::Retry { .. }));

    let done = app.submit("signup", wrong.version, StageInput::new().with("token", last_code(&app)))
                  .expect("verify");
    assert_eq!(done.status, FlowStatus::Completed);
    assert_eq!(done.completed().and_then(|c| c.user), Some(carol.id));

    // la invitación es de un solo uso: el segundo alta sigue sin datos fijos
    let again = app.start("signup-2",
                          DEFAULT_ENROLLMENT,
                          FlowRequest::new().with_context(CTX_INVITATION, ContextValue::Str(token)))
                   .expect("start again");
    let again = app.submit("signup-2", again.version, account("dave", "Sup3rSecret", "Sup3rSecret"))
                   .expect("account");
    assert_eq!(again.status, FlowStatus::SuspendedWaitingInput);
    let dave = app.users
                  .find_by_field(UserField::Username, "dave", false)
                  .expect("lookup")
                  .expect("user written");
    assert!(dave.name.is_empty());
}

#[test]
fn taken_username_is_retried_and_mismatched_passwords_rejected() {
    let app = app();
    let resp = app.start("a", DEFAULT_ENROLLMENT, FlowRequest::new()).expect("start");
    app.submit("a", resp.version, account("erin", "Sup3rSecret", "Sup3rSecret")).expect("first");

    let resp = app.start("b", DEFAULT_ENROLLMENT, FlowRequest::new()).expect("start");
    let mismatch = app.submit("b", resp.version, account("erin", "Sup3rSecret", "Different1"))
                      .expect("mismatch");
    assert!(matches!(&mismatch.outcome,
                     FlowOutcome::Retry { error: FlowError::RetriableStage { message, .. }, .. }
                         if message == "Passwords don't match."));

    let taken = app.submit("b", mismatch.version, account("erin", "Sup3rSecret", "Sup3rSecret"))
                   .expect("taken");
    match &taken.outcome {
        FlowOutcome::Retry { error: FlowError::RetriableStage { message, stage_id, .. }, .. } => {
            assert_eq!(message, "This username is already taken.");
            assert_eq!(stage_id, "default-enrollment-user-write");
        }
        other => panic!("expected retry, got {other:?}"),
    }

    // reenviar otro username en el mismo stage corrige el alta
    let resp = app.submit("b", taken.version, StageInput::new().with("username", "frank"))
                  .expect("corrected");
    assert_eq!(resp.prompt().map(|p| p.stage_id.as_str()), Some("default-enrollment-email"));
    let frank = app.users
                   .find_by_field(UserField::Username, "frank", false)
                   .expect("lookup")
                   .expect("user written");
    assert_eq!(frank.email, "erin@example.com");
    assert!(app.users.check_password(&frank, "Sup3rSecret").expect("check"));
    let snapshot = app.executor().current("b").expect("load").expect("snapshot");
    assert_eq!(snapshot.plan.context.pending_user(), Some(frank.id));
}
