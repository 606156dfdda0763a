//! Setup y validación de autenticadores OTP.

use log::{debug, info};
use serde_json::json;
use subtle::ConstantTimeEq;

use super::pending_user;
use crate::constants::{CTX_OTP_STATIC_TOKENS, CTX_OTP_TIME_SECRET};
use crate::errors::StageError;
use crate::model::{ContextPatch, ContextValue, OtpAlgorithm, TotpDevice};
use crate::otp::{generate_secret, generate_static_tokens, provisioning_uri, verify_totp};
use crate::services::{AuditAction, AuditEvent};
use crate::stage::{Stage, StageInput, StagePrompt, StageRequest, StageVerdict};

pub(in crate::stage) struct DeviceSettings<'a> {
    pub digits: u32,
    pub period: u64,
    pub algorithm: OtpAlgorithm,
    pub issuer: &'a str,
}

pub(in crate::stage) fn handle_time(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                                    settings: &DeviceSettings<'_>)
                                    -> Result<StageVerdict, StageError> {
    let mut user = pending_user(request)?;
    let existing = request.context.get_str(CTX_OTP_TIME_SECRET).map(str::to_owned);
    let secret = existing.clone().unwrap_or_else(generate_secret);
    let device = TotpDevice { secret,
                              digits: settings.digits,
                              period: settings.period,
                              algorithm: settings.algorithm };

    let code = input.and_then(|i| i.get_str("code"));
    let Some(code) = code else {
        if input.is_some() && existing.is_some() {
            return Ok(StageVerdict::retry("Please enter the code from your authenticator."));
        }
        let uri = provisioning_uri(&device, settings.issuer, &user.username)
            .ok_or_else(|| StageError::Fatal("could not build provisioning uri".into()))?;
        let mut patch = ContextPatch::new();
        if existing.is_none() {
            patch = patch.set_sensitive(CTX_OTP_TIME_SECRET, ContextValue::Str(device.secret.clone()));
        }
        let prompt = StagePrompt::for_stage(stage, json!({ "config_url": uri, "digits": device.digits }));
        return Ok(StageVerdict::Suspend { prompt, patch });
    };

    if existing.is_none() {
        // El secreto se genera al mostrar el prompt; un código sin él no es verificable.
        return Ok(StageVerdict::retry("Authenticator setup expired, please reload."));
    }
    if !verify_totp(&device, code, request.now, 1) {
        return Ok(StageVerdict::retry("Code does not match."));
    }

    user.totp_device = Some(device);
    let user = request.services.users.save(user)?;
    request.services.audit.record(&AuditEvent::new(AuditAction::OtpDeviceCreated).user(&user)
                                                                                 .detail(json!({ "kind": "totp" })));
    info!("totp device confirmed user={}", user.id);
    Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_OTP_TIME_SECRET)))
}

fn stored_tokens(request: &StageRequest<'_>) -> Option<Vec<String>> {
    request.context
           .get(CTX_OTP_STATIC_TOKENS)
           .and_then(|v| v.as_record())
           .and_then(|v| serde_json::from_value(v.clone()).ok())
}

pub(in crate::stage) fn handle_static(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                                      token_count: usize)
                                      -> Result<StageVerdict, StageError> {
    let mut user = pending_user(request)?;
    let existing = stored_tokens(request);

    match (input, existing) {
        (Some(input), Some(tokens)) if input.get_bool("confirm") => {
            user.static_tokens = tokens;
            let user = request.services.users.save(user)?;
            request.services.audit.record(&AuditEvent::new(AuditAction::OtpDeviceCreated).user(&user)
                                                                                         .detail(json!({ "kind": "static" })));
            Ok(StageVerdict::Advance(ContextPatch::new().remove(CTX_OTP_STATIC_TOKENS)))
        }
        (Some(_), Some(_)) => Ok(StageVerdict::retry("Please confirm that you saved your tokens.")),
        (_, existing) => {
            let fresh = existing.is_none();
            let tokens = existing.unwrap_or_else(|| generate_static_tokens(token_count));
            let prompt = StagePrompt::for_stage(stage, json!({ "tokens": tokens }));
            let patch = if fresh {
                ContextPatch::new().set_sensitive(CTX_OTP_STATIC_TOKENS, ContextValue::Record(json!(tokens)))
            } else {
                ContextPatch::new()
            };
            Ok(StageVerdict::Suspend { prompt, patch })
        }
    }
}

pub(in crate::stage) fn handle_validate(stage: &Stage, request: &StageRequest<'_>, input: Option<&StageInput>,
                                        skew: u32, skip_if_not_configured: bool)
                                        -> Result<StageVerdict, StageError> {
    let mut user = pending_user(request)?;
    if !user.has_otp_device() {
        if skip_if_not_configured {
            debug!("otp validation skipped, no device user={}", user.id);
            return Ok(StageVerdict::advance());
        }
        return Ok(StageVerdict::cancel("No authenticator configured."));
    }

    let Some(input) = input else {
        let digits = user.totp_device.as_ref().map(|d| d.digits);
        return Ok(StageVerdict::suspend(StagePrompt::for_stage(stage, json!({ "digits": digits }))));
    };
    let Some(code) = input.get_str("code") else {
        return Ok(StageVerdict::retry("Please enter a code."));
    };

    if let Some(device) = &user.totp_device {
        if verify_totp(device, code, request.now, skew) {
            return Ok(StageVerdict::advance());
        }
    }

    // tokens estáticos: un solo uso
    let matched = user.static_tokens
                      .iter()
                      .position(|t| bool::from(t.as_bytes().ct_eq(code.as_bytes())));
    if let Some(pos) = matched {
        user.static_tokens.remove(pos);
        request.services.users.save(user)?;
        return Ok(StageVerdict::advance());
    }

    request.services.audit.record(&AuditEvent::new(AuditAction::LoginFailed).user(&user)
                                                                            .remote_addr(request.remote_addr)
                                                                            .detail(json!({ "stage": stage.id, "reason": "otp" })));
    Ok(StageVerdict::retry("Invalid code."))
}
