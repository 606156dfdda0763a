//! Flows por defecto.
//!
//! Equivalen a los blueprints que una instalación nueva trae de fábrica:
//! login, alta, recuperación, logout, alta de autenticador y baja.

use std::sync::Arc;

use passflow_core::model::OtpAlgorithm;
use passflow_core::{FlowDefinition, FlowDesignation, PolicyBinding, PromptField, PromptFieldKind, Stage, StageKind,
                    UserField};
use passflow_policies::{ReputationPolicy, ReputationStore};

pub const DEFAULT_AUTHENTICATION: &str = "default-authentication";
pub const DEFAULT_ENROLLMENT: &str = "default-enrollment";
pub const DEFAULT_RECOVERY: &str = "default-recovery";
pub const DEFAULT_INVALIDATION: &str = "default-invalidation";
pub const DEFAULT_OTP_SETUP: &str = "default-otp-time-setup";
pub const DEFAULT_UNENROLLMENT: &str = "default-unenrollment";

/// Nombre con el que se registra la política de complejidad usada por los
/// prompts de contraseña.
pub const PASSWORD_COMPLEXITY_POLICY: &str = "default-password-complexity";

const SESSION_DURATION_SECS: u64 = 24 * 60 * 60;
const EMAIL_TOKEN_EXPIRY_MINUTES: i64 = 30;

fn login_stage() -> Stage {
    Stage::new("default-login", StageKind::UserLogin { session_duration_secs: SESSION_DURATION_SECS })
}

fn identification_stage() -> Stage {
    Stage::new("default-identification",
               StageKind::Identification { user_fields: vec![UserField::Username, UserField::Email],
                                           case_insensitive: true })
}

fn new_password_fields() -> Vec<PromptField> {
    vec![PromptField::new("password", "Password", PromptFieldKind::Password),
         PromptField::new("password_repeat", "Password (repeat)", PromptFieldKind::Password)]
}

/// Identificación, contraseña y login. Con `reputation` el flow entero se
/// deniega a IPs o usuarios con demasiados fallos.
pub fn default_authentication(reputation: Option<Arc<ReputationStore>>) -> FlowDefinition {
    let mut flow = FlowDefinition::new(DEFAULT_AUTHENTICATION, FlowDesignation::Authentication)
        .named("Welcome!")
        .stage(identification_stage())
        .stage(Stage::new("default-password", StageKind::Password))
        .stage(login_stage());
    if let Some(store) = reputation {
        flow = flow.bind(PolicyBinding::new(Arc::new(ReputationPolicy::new("default-reputation", store)), 0));
    }
    flow
}

/// Invitación opcional, datos de la cuenta, verificación de email y login.
pub fn default_enrollment() -> FlowDefinition {
    let mut fields = vec![PromptField::new("username", "Username", PromptFieldKind::Text),
                          PromptField::new("name", "Name", PromptFieldKind::Text).optional(),
                          PromptField::new("email", "Email", PromptFieldKind::Email)];
    fields.extend(new_password_fields());
    FlowDefinition::new(DEFAULT_ENROLLMENT, FlowDesignation::Enrollment)
        .named("Create an account")
        .stage(Stage::new("default-enrollment-invitation",
                          StageKind::Invitation { continue_flow_without_invitation: true }))
        .stage(Stage::new("default-enrollment-prompt",
                          StageKind::Prompt { fields,
                                              validation_policies: vec![PASSWORD_COMPLEXITY_POLICY.to_string()] }))
        .stage(Stage::new("default-enrollment-user-write", StageKind::UserWrite))
        .stage(Stage::new("default-enrollment-email",
                          StageKind::Email { subject: "Verify your account".into(),
                                             token_expiry_minutes: EMAIL_TOKEN_EXPIRY_MINUTES }))
        .stage(login_stage())
}

/// Identificación, código por email, contraseña nueva y login.
pub fn default_recovery() -> FlowDefinition {
    FlowDefinition::new(DEFAULT_RECOVERY, FlowDesignation::Recovery)
        .named("Reset your password")
        .stage(identification_stage())
        .stage(Stage::new("default-recovery-email",
                          StageKind::Email { subject: "Password recovery".into(),
                                             token_expiry_minutes: EMAIL_TOKEN_EXPIRY_MINUTES }))
        .stage(Stage::new("default-recovery-password",
                          StageKind::Prompt { fields: new_password_fields(),
                                              validation_policies: vec![PASSWORD_COMPLEXITY_POLICY.to_string()] }))
        .stage(Stage::new("default-recovery-user-write", StageKind::UserWrite))
        .stage(login_stage())
}

pub fn default_invalidation() -> FlowDefinition {
    FlowDefinition::new(DEFAULT_INVALIDATION, FlowDesignation::Invalidation)
        .named("Logout")
        .stage(Stage::new("default-logout", StageKind::UserLogout))
}

pub fn default_otp_setup() -> FlowDefinition {
    FlowDefinition::new(DEFAULT_OTP_SETUP, FlowDesignation::StageSetup)
        .named("Set up an authenticator app")
        .stage(Stage::new("default-otp-time",
                          StageKind::OtpTime { digits: 6,
                                               period: 30,
                                               algorithm: OtpAlgorithm::Sha1,
                                               issuer: "passflow".into() }))
}

pub fn default_unenrollment() -> FlowDefinition {
    FlowDefinition::new(DEFAULT_UNENROLLMENT, FlowDesignation::Unenrollment)
        .named("Delete your account")
        .stage(Stage::new("default-unenrollment-delete", StageKind::UserDelete))
}

/// Todos los flows por defecto.
pub fn default_flows(reputation: Option<Arc<ReputationStore>>) -> Vec<FlowDefinition> {
    vec![default_authentication(reputation),
         default_enrollment(),
         default_recovery(),
         default_invalidation(),
         default_otp_setup(),
         default_unenrollment()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn slugs_are_unique_and_stage_ids_too() {
        let flows = default_flows(None);
        let slugs: HashSet<_> = flows.iter().map(|f| f.slug.as_str()).collect();
        assert_eq!(slugs.len(), flows.len());
        for flow in &flows {
            let ids: HashSet<_> = flow.stages.iter().map(|b| b.stage.id.as_str()).collect();
            assert_eq!(ids.len(), flow.stages.len(), "duplicate stage id in {}", flow.slug);
        }
    }

    #[test]
    fn reputation_binding_is_optional() {
        assert!(default_authentication(None).bindings.is_empty());
        assert_eq!(default_authentication(Some(Arc::new(ReputationStore::new()))).bindings.len(), 1);
    }
}
