//! Stages: la unidad atómica de un flow.

pub mod definition;
mod handlers;
pub mod verdict;

pub use definition::{PromptField, PromptFieldKind, Stage, StageKind};
pub use verdict::{StageInput, StagePrompt, StageRequest, StageVerdict};

use crate::errors::StageError;

impl Stage {
    /// Ejecuta el stage contra el contexto actual. `input` es `None` cuando
    /// el executor despacha el stage por primera vez (tras avanzar).
    ///
    /// El stage nunca modifica el contexto directamente: devuelve un
    /// `ContextPatch` dentro del veredicto.
    pub fn handle_input(&self, request: &StageRequest<'_>, input: Option<&StageInput>)
                        -> Result<StageVerdict, StageError> {
        match &self.kind {
            StageKind::Identification { user_fields,
                                        case_insensitive, } => {
                handlers::identification::handle(self, request, input, user_fields, *case_insensitive)
            }
            StageKind::Password => handlers::password::handle(self, request, input),
            StageKind::OtpStatic { token_count } => handlers::otp::handle_static(self, request, input, *token_count),
            StageKind::OtpTime { digits,
                                 period,
                                 algorithm,
                                 issuer, } => {
                let device = handlers::otp::DeviceSettings { digits: *digits,
                                                             period: *period,
                                                             algorithm: *algorithm,
                                                             issuer };
                handlers::otp::handle_time(self, request, input, &device)
            }
            StageKind::OtpValidate { skew,
                                     skip_if_not_configured, } => {
                handlers::otp::handle_validate(self, request, input, *skew, *skip_if_not_configured)
            }
            StageKind::Consent { permissions } => handlers::consent::handle(self, input, permissions),
            StageKind::Captcha { public_key,
                                 private_key, } => {
                handlers::captcha::handle(self, request, input, public_key, private_key)
            }
            StageKind::UserWrite => handlers::user::handle_write(request, input),
            StageKind::UserLogin { session_duration_secs } => {
                handlers::user::handle_login(request, *session_duration_secs)
            }
            StageKind::UserLogout => handlers::user::handle_logout(request),
            StageKind::UserDelete => handlers::user::handle_delete(self, request, input),
            StageKind::Invitation { continue_flow_without_invitation } => {
                handlers::invitation::handle(request, input, *continue_flow_without_invitation)
            }
            StageKind::Prompt { fields,
                                validation_policies, } => {
                handlers::prompt::handle(self, request, input, fields, validation_policies)
            }
            StageKind::Email { subject,
                               token_expiry_minutes, } => {
                handlers::email::handle(self, request, input, subject, *token_expiry_minutes)
            }
            StageKind::Dummy => Ok(match input {
                None => StageVerdict::suspend(StagePrompt::for_stage(self, serde_json::Value::Null)),
                Some(_) => StageVerdict::advance(),
            }),
            StageKind::ExpiryCheck { max_age_days } => handlers::user::handle_expiry(request, *max_age_days),
        }
    }
}
