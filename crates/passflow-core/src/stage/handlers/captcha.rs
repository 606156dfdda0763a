use log::warn;
use serde_json::json;

use crate::errors::StageError;
use crate::stage::{Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

pub(in crate::stage) fn handle(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                               public_key: &str, private_key: &str)
                               -> Result<StageVerdict, StageError> {
    let Some(input) = input else {
        return Ok(StageVerdict::suspend(StagePrompt::for_stage(stage, json!({ "site_key": public_key }))));
    };
    let Some(token) = input.get_str("token") else {
        return Ok(StageVerdict::retry("Please complete the captcha."));
    };
    match request.services.captcha.verify(private_key, token, request.remote_addr) {
        Ok(true) => Ok(StageVerdict::advance()),
        Ok(false) => Ok(StageVerdict::retry("Invalid captcha response.")),
        Err(e) => {
            // proveedor caído: el usuario puede reintentar
            warn!("captcha verification failed stage={} err={e}", stage.id);
            Ok(StageVerdict::retry("Captcha verification is unavailable, please try again."))
        }
    }
}
