//! Definición declarativa de stages.
//!
//! Un `Stage` es dato puro: identificador, tipo (con su configuración
//! inmutable) y límites de ejecución. Se serializa dentro del `FlowPlan`,
//! por lo que un plan persistido puede reanudarse sin consultar la
//! configuración original.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{OtpAlgorithm, UserField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptFieldKind {
    Text,
    Email,
    Password,
    Number,
    Checkbox,
    Hidden,
}

/// Campo de un stage `Prompt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptField {
    pub field_key: String,
    pub label: String,
    pub kind: PromptFieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub placeholder: Option<String>,
}

impl PromptField {
    pub fn new(field_key: impl Into<String>, label: impl Into<String>, kind: PromptFieldKind) -> Self {
        Self { field_key: field_key.into(),
               label: label.into(),
               kind,
               required: true,
               placeholder: None }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }
}

/// Conjunto cerrado de tipos de stage. Cada variante lleva su configuración.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageKind {
    Identification {
        user_fields: Vec<UserField>,
        case_insensitive: bool,
    },
    Password,
    OtpStatic {
        token_count: usize,
    },
    OtpTime {
        digits: u32,
        period: u64,
        algorithm: OtpAlgorithm,
        issuer: String,
    },
    OtpValidate {
        /// Ventanas de tolerancia a cada lado del instante actual.
        skew: u32,
        /// Si el usuario no tiene device: avanzar (`true`) o cancelar.
        skip_if_not_configured: bool,
    },
    Consent {
        permissions: Vec<String>,
    },
    Captcha {
        public_key: String,
        private_key: String,
    },
    UserWrite,
    UserLogin {
        session_duration_secs: u64,
    },
    UserLogout,
    UserDelete,
    Invitation {
        continue_flow_without_invitation: bool,
    },
    Prompt {
        fields: Vec<PromptField>,
        /// Nombres de políticas del `PolicyRegistry` que validan el input.
        validation_policies: Vec<String>,
    },
    Email {
        subject: String,
        token_expiry_minutes: i64,
    },
    Dummy,
    ExpiryCheck {
        max_age_days: i64,
    },
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Identification { .. } => "identification",
            StageKind::Password => "password",
            StageKind::OtpStatic { .. } => "otp_static",
            StageKind::OtpTime { .. } => "otp_time",
            StageKind::OtpValidate { .. } => "otp_validate",
            StageKind::Consent { .. } => "consent",
            StageKind::Captcha { .. } => "captcha",
            StageKind::UserWrite => "user_write",
            StageKind::UserLogin { .. } => "user_login",
            StageKind::UserLogout => "user_logout",
            StageKind::UserDelete => "user_delete",
            StageKind::Invitation { .. } => "invitation",
            StageKind::Prompt { .. } => "prompt",
            StageKind::Email { .. } => "email",
            StageKind::Dummy => "dummy",
            StageKind::ExpiryCheck { .. } => "expiry_check",
        }
    }

    /// Stages que leen credenciales del contexto. Tras avanzar uno de ellos
    /// el executor purga las entradas sensibles.
    pub fn consumes_credentials(&self) -> bool {
        matches!(self,
                 StageKind::Password
                 | StageKind::OtpTime { .. }
                 | StageKind::OtpStatic { .. }
                 | StageKind::OtpValidate { .. }
                 | StageKind::UserWrite
                 | StageKind::Email { .. })
    }

    /// Stages expuestos a adivinación de credenciales: sin `max_attempts`
    /// explícito usan el límite global de la configuración.
    pub fn guards_credentials(&self) -> bool {
        matches!(self,
                 StageKind::Password
                 | StageKind::OtpValidate { .. }
                 | StageKind::OtpTime { .. }
                 | StageKind::Captcha { .. }
                 | StageKind::Email { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: String,
    #[serde(flatten)]
    pub kind: StageKind,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Stage {
    pub fn new(id: impl Into<String>, kind: StageKind) -> Self {
        Self { id: id.into(),
               kind,
               max_attempts: None,
               timeout_ms: None }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Límite efectivo de reintentos; `None` = ilimitado.
    pub fn effective_max_attempts(&self, credential_default: u32) -> Option<u32> {
        match self.max_attempts {
            Some(max) => Some(max),
            None if self.kind.guards_credentials() => Some(credential_default),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_stages_default_to_global_limit() {
        assert_eq!(Stage::new("pw", StageKind::Password).effective_max_attempts(3), Some(3));
        assert_eq!(Stage::new("d", StageKind::Dummy).effective_max_attempts(3), None);
        assert_eq!(Stage::new("d", StageKind::Dummy).with_max_attempts(1).effective_max_attempts(3), Some(1));
    }

    #[test]
    fn huge_timeouts_saturate_instead_of_wrapping() {
        let stage = Stage::new("d", StageKind::Dummy).with_timeout(Duration::MAX);
        assert_eq!(stage.timeout_ms, Some(u64::MAX));
        let stage = Stage::new("d", StageKind::Dummy).with_timeout(Duration::from_millis(1500));
        assert_eq!(stage.timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn stage_json_is_flat_and_tagged() {
        let stage = Stage::new("login", StageKind::UserLogin { session_duration_secs: 60 });
        let json = serde_json::to_value(&stage).expect("serialize");
        assert_eq!(json["kind"], "user_login");
        assert_eq!(json["session_duration_secs"], 60);
        let back: Stage = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, stage);
    }
}
