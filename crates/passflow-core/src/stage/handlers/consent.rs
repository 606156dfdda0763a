use serde_json::json;

use crate::constants::CTX_CONSENT_GIVEN;
use crate::errors::StageError;
use crate::model::{ContextPatch, ContextValue};
use crate::stage::{Stage, StageInput, StagePrompt, StageVerdict};

pub(in crate::stage) fn handle(stage: &Stage, input: Option<&StageInput>, permissions: &[String])
                               -> Result<StageVerdict, StageError> {
    let prompt = || StagePrompt::for_stage(stage, json!({ "permissions": permissions }));
    let Some(input) = input else {
        return Ok(StageVerdict::suspend(prompt()));
    };
    if input.get_bool("deny") {
        return Ok(StageVerdict::cancel("Consent denied."));
    }
    if input.get_bool("confirm") {
        return Ok(StageVerdict::Advance(ContextPatch::new().set(CTX_CONSENT_GIVEN, ContextValue::Bool(true))));
    }
    Ok(StageVerdict::suspend(prompt()))
}
