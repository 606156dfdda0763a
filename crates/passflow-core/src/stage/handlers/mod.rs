//! Implementación de cada tipo de stage. Una función por tipo; el dispatch
//! exhaustivo vive en `Stage::handle_input`.

pub(super) mod captcha;
pub(super) mod consent;
pub(super) mod email;
pub(super) mod identification;
pub(super) mod invitation;
pub(super) mod otp;
pub(super) mod password;
pub(super) mod prompt;
pub(super) mod user;

use serde_json::{Map, Value};

use super::StageRequest;
use crate::constants::CTX_PROMPT_DATA;
use crate::errors::StageError;
use crate::model::User;

/// Usuario pendiente del contexto, resuelto contra el directorio.
fn pending_user(request: &StageRequest<'_>) -> Result<User, StageError> {
    let id = request.context
                    .pending_user()
                    .ok_or_else(|| StageError::Fatal("no pending user in flow context".into()))?;
    request.services
           .users
           .get(id)?
           .ok_or_else(|| StageError::Fatal(format!("pending user {id} no longer exists")))
}

/// `prompt_data` actual como objeto JSON (vacío si no existe).
fn prompt_data(request: &StageRequest<'_>) -> Map<String, Value> {
    request.context
           .get(CTX_PROMPT_DATA)
           .and_then(|v| v.as_record())
           .and_then(Value::as_object)
           .cloned()
           .unwrap_or_default()
}
