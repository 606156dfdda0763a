//! Stages que escriben sobre el directorio de usuarios y las sesiones.

use chrono::Duration;
use log::{debug, info};
use serde_json::{json, Value};

use super::{pending_user, prompt_data};
use crate::constants::{CTX_AUTHENTICATED_SESSION, CTX_PASSWORD, CTX_PENDING_USER, CTX_PROMPT_DATA};
use crate::errors::{ServiceError, StageError};
use crate::model::{ContextPatch, ContextValue, User};
use crate::services::{AuditAction, AuditEvent};
use crate::stage::{Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

fn record_str<'a>(data: &'a serde_json::Map<String, Value>, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Campos de identidad que se pueden corregir reenviando el stage.
const CORRECTABLE_FIELDS: [&str; 3] = ["username", "email", "name"];

/// Crea o actualiza el usuario con `prompt_data` y la contraseña sensible.
/// Un input (reenvío tras un username ocupado) se aplica sobre `prompt_data`.
pub(in crate::stage) fn handle_write(request: &StageRequest<'_>, input: Option<&StageInput>)
                                     -> Result<StageVerdict, StageError> {
    let mut data = prompt_data(request);
    let mut corrected = false;
    for key in CORRECTABLE_FIELDS {
        if let Some(value) = input.and_then(|i| i.get_str(key)) {
            data.insert(key.to_string(), Value::String(value.to_string()));
            corrected = true;
        }
    }
    // recovery sólo trae la contraseña nueva
    if data.is_empty() && !request.context.contains(CTX_PASSWORD) {
        return Err(StageError::Fatal("user write without prompt data or password".into()));
    }

    let mut user = match request.context.pending_user() {
        Some(_) => pending_user(request)?,
        None => {
            let Some(username) = record_str(&data, "username") else {
                return Ok(StageVerdict::retry("A username is required."));
            };
            User::new(username, record_str(&data, "email").unwrap_or_default())
        }
    };
    if let Some(username) = record_str(&data, "username") {
        user.username = username.to_string();
    }
    if let Some(email) = record_str(&data, "email") {
        user.email = email.to_string();
    }
    if let Some(name) = record_str(&data, "name") {
        user.name = name.to_string();
    }

    let user = match request.services.users.save(user) {
        Ok(user) => user,
        Err(ServiceError::Conflict(_)) => return Ok(StageVerdict::retry("This username is already taken.")),
        Err(e) => return Err(e.into()),
    };
    if let Some(password) = request.context.get_str(CTX_PASSWORD) {
        request.services.users.set_password(user.id, password)?;
    }

    request.services.audit.record(&AuditEvent::new(AuditAction::UserWrite).user(&user)
                                                                          .remote_addr(request.remote_addr));
    info!("user written id={}", user.id);
    let mut patch = ContextPatch::new().remove(CTX_PASSWORD)
                                       .set(CTX_PENDING_USER, ContextValue::user(user.id));
    if corrected {
        patch = patch.set(CTX_PROMPT_DATA, ContextValue::Record(Value::Object(data)));
    }
    Ok(StageVerdict::Advance(patch))
}

pub(in crate::stage) fn handle_login(request: &StageRequest<'_>, session_duration_secs: u64)
                                     -> Result<StageVerdict, StageError> {
    let user = pending_user(request)?;
    if !user.is_active {
        return Ok(StageVerdict::cancel("This account is disabled."));
    }
    let duration = i64::try_from(session_duration_secs).ok()
                                                        .and_then(Duration::try_seconds)
                                                        .ok_or_else(|| StageError::Fatal("session duration out of range".into()))?;
    let session = request.services.sessions.issue(&user, duration)?;
    let session = serde_json::to_value(&session).map_err(|e| StageError::Fatal(format!("session encode: {e}")))?;

    request.services.audit.record(&AuditEvent::new(AuditAction::Login).user(&user)
                                                                      .remote_addr(request.remote_addr));
    Ok(StageVerdict::Advance(ContextPatch::new().set(CTX_AUTHENTICATED_SESSION, ContextValue::Record(session))))
}

pub(in crate::stage) fn handle_logout(request: &StageRequest<'_>) -> Result<StageVerdict, StageError> {
    let token = request.context
                       .get(CTX_AUTHENTICATED_SESSION)
                       .and_then(|v| v.as_record())
                       .and_then(|v| v.get("token"))
                       .and_then(Value::as_str);
    let Some(token) = token else {
        debug!("logout without authenticated session, nothing to revoke");
        return Ok(StageVerdict::advance());
    };
    let revoked = request.services.sessions.revoke(token)?;

    let mut event = AuditEvent::new(AuditAction::Logout).remote_addr(request.remote_addr);
    if let Ok(user) = pending_user(request) {
        event = event.user(&user);
    }
    request.services.audit.record(&event.detail(json!({ "revoked": revoked })));
    Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_AUTHENTICATED_SESSION)))
}

pub(in crate::stage) fn handle_delete(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>)
                                      -> Result<StageVerdict, StageError> {
    let user = pending_user(request)?;
    let Some(input) = input else {
        return Ok(StageVerdict::suspend(StagePrompt::for_stage(stage, json!({ "username": user.username }))));
    };
    if !input.get_bool("confirm") {
        return Ok(StageVerdict::cancel("Account deletion aborted."));
    }
    request.services.users.delete(user.id)?;
    request.services.audit.record(&AuditEvent::new(AuditAction::UserDelete).user(&user)
                                                                           .remote_addr(request.remote_addr));
    info!("user deleted id={}", user.id);
    Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_PENDING_USER)))
}

/// Cancela si la contraseña del usuario pendiente es más antigua que
/// `max_age_days`.
pub(in crate::stage) fn handle_expiry(request: &StageRequest<'_>, max_age_days: i64)
                                      -> Result<StageVerdict, StageError> {
    let user = pending_user(request)?;
    let expires = Duration::try_days(max_age_days).and_then(|d| user.password_changed.checked_add_signed(d));
    if expires.is_some_and(|e| e < request.now) {
        debug!("password expired user={} changed={}", user.id, user.password_changed);
        return Ok(StageVerdict::cancel("Password expired."));
    }
    Ok(StageVerdict::advance())
}
