use serde_json::json;

use super::pending_user;
use crate::constants::CTX_PASSWORD;
use crate::errors::StageError;
use crate::model::ContextPatch;
use crate::services::{AuditAction, AuditEvent};
use crate::stage::{Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

pub(in crate::stage) fn handle(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>)
                               -> Result<StageVerdict, StageError> {
    let user = pending_user(request)?;

    // input explícito primero; si no, la contraseña recogida por un Prompt
    let password = input.and_then(|i| i.fields.get(CTX_PASSWORD))
                        .and_then(|v| v.as_str())
                        .or_else(|| request.context.get_str(CTX_PASSWORD));
    let Some(password) = password else {
        return Ok(match input {
            None => StageVerdict::suspend(StagePrompt::for_stage(stage, json!({ "pending_user": user.username }))),
            Some(_) => StageVerdict::retry("Please enter your password."),
        });
    };

    if request.services.users.check_password(&user, password)? {
        return Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_PASSWORD)));
    }

    request.services.audit.record(&AuditEvent::new(AuditAction::LoginFailed).user(&user)
                                                                            .remote_addr(request.remote_addr)
                                                                            .detail(json!({ "stage": stage.id })));
    // la contraseña probada no se reutiliza en el siguiente intento
    Ok(StageVerdict::retry_with("Invalid password.", ContextPatch::new().remove(CTX_PASSWORD)))
}
