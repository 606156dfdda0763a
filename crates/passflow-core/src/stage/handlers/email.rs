use chrono::{DateTime, Duration, Utc};
use log::warn;
use rand::RngCore;
use serde_json::json;
use subtle::ConstantTimeEq;

use super::pending_user;
use crate::constants::{CTX_EMAIL_TOKEN, CTX_EMAIL_TOKEN_EXPIRES, CTX_EMAIL_VERIFIED};
use crate::errors::StageError;
use crate::model::{ContextPatch, ContextValue};
use crate::services::Notification;
use crate::stage::{Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

const TOKEN_BYTES: usize = 16;

fn new_token() -> String {
    let mut raw = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

/// Sin token en el input se (re)envía uno nuevo.
pub(in crate::stage) fn handle(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                               subject: &str, token_expiry_minutes: i64)
                               -> Result<StageVerdict, StageError> {
    let user = pending_user(request)?;

    let Some(submitted) = input.and_then(|i| i.get_str("token")) else {
        let token = new_token();
        let expires = Duration::try_minutes(token_expiry_minutes).and_then(|d| request.now.checked_add_signed(d))
                                                                 .ok_or_else(|| {
                                                                     StageError::Fatal("token expiry out of range".into())
                                                                 })?;
        let notification = Notification { to: user.email.clone(),
                                          subject: subject.to_string(),
                                          body: format!("Your verification code is {token}. It expires at {}.",
                                                        expires.to_rfc3339()) };
        if let Err(e) = request.services.notifications.send(&notification) {
            warn!("verification email not sent user={} err={e}", user.id);
            return Ok(StageVerdict::retry("We could not send the verification email, please try again."));
        }
        let prompt = StagePrompt::for_stage(stage, json!({ "email": user.email, "expires": expires }));
        let patch = ContextPatch::new().set_sensitive(CTX_EMAIL_TOKEN, ContextValue::Str(token))
                                       .set(CTX_EMAIL_TOKEN_EXPIRES, ContextValue::Str(expires.to_rfc3339()));
        return Ok(StageVerdict::Suspend { prompt, patch });
    };

    let expected = request.context.get_str(CTX_EMAIL_TOKEN);
    let expires = request.context
                         .get_str(CTX_EMAIL_TOKEN_EXPIRES)
                         .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                         .map(|d| d.with_timezone(&Utc));
    let matches = expected.is_some_and(|t| bool::from(t.as_bytes().ct_eq(submitted.as_bytes())));
    if !matches {
        return Ok(StageVerdict::retry("Invalid verification code."));
    }
    if expires.map_or(true, |e| e <= request.now) {
        return Ok(StageVerdict::retry("The verification code has expired, request a new one."));
    }
    Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_EMAIL_TOKEN)
                                                .remove(CTX_EMAIL_TOKEN_EXPIRES)
                                                .set(CTX_EMAIL_VERIFIED, ContextValue::Bool(true))))
}
