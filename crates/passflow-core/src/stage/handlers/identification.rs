use log::debug;
use serde_json::json;

use crate::constants::CTX_PENDING_USER;
use crate::errors::StageError;
use crate::model::{ContextPatch, ContextValue, UserField};
use crate::services::{AuditAction, AuditEvent};
use crate::stage::{Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

/// Mensaje genérico: no revela si el usuario existe.
const FAILED: &str = "Failed to authenticate.";

pub(in crate::stage) fn handle(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                               user_fields: &[UserField], case_insensitive: bool)
                               -> Result<StageVerdict, StageError> {
    let Some(input) = input else {
        return Ok(StageVerdict::suspend(StagePrompt::for_stage(stage, json!({ "user_fields": user_fields }))));
    };
    let Some(uid) = input.get_str("uid_field") else {
        return Ok(StageVerdict::retry("Please enter your username or email."));
    };

    for field in user_fields {
        if let Some(user) = request.services.users.find_by_field(*field, uid, case_insensitive)? {
            if !user.is_active {
                debug!("identification matched inactive user id={}", user.id);
                break;
            }
            return Ok(StageVerdict::Advance(ContextPatch::new().set(CTX_PENDING_USER, ContextValue::user(user.id))));
        }
    }

    request.services.audit.record(&AuditEvent::new(AuditAction::LoginFailed).username(uid)
                                                                            .remote_addr(request.remote_addr)
                                                                            .detail(json!({ "stage": stage.id })));
    Ok(StageVerdict::retry(FAILED))
}
