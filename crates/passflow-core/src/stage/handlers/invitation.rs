use log::debug;
use serde_json::{json, Value};

use super::prompt_data;
use crate::constants::{CTX_INVITATION, CTX_PROMPT_DATA};
use crate::errors::StageError;
use crate::model::{ContextPatch, ContextValue};
use crate::services::{AuditAction, AuditEvent};
use crate::stage::{StageInput, StageRequest, StageVerdict};

/// El token llega en el contexto inicial (enlace de invitación) o en el input.
pub(in crate::stage) fn handle(request: &StageRequest<'_>, input: Option<&StageInput>,
                               continue_flow_without_invitation: bool)
                               -> Result<StageVerdict, StageError> {
    let token = input.and_then(|i| i.get_str("token"))
                     .or_else(|| request.context.get_str(CTX_INVITATION));
    let invitation = match token {
        Some(token) => request.services.invitations.consume(token)?,
        None => None,
    };

    let Some(invitation) = invitation else {
        if continue_flow_without_invitation {
            debug!("no usable invitation, continuing flow");
            return Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_INVITATION)));
        }
        return Ok(StageVerdict::cancel("A valid invitation is required."));
    };

    let mut data = prompt_data(request);
    if let Value::Object(fixed) = &invitation.fixed_data {
        data.extend(fixed.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    request.services.audit.record(&AuditEvent::new(AuditAction::InvitationUsed).remote_addr(request.remote_addr)
                                                                               .detail(json!({ "invitation": invitation.id })));
    Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_INVITATION)
                                                .set(CTX_PROMPT_DATA, ContextValue::Record(Value::Object(data)))))
}
