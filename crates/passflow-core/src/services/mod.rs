//! Colaboradores externos que consumen los stages.
//!
//! El core sólo define los contratos; las implementaciones reales (ORM,
//! SMTP, proveedor de captcha...) viven fuera. `memory` provee versiones en
//! memoria para tests y para la demo.

pub mod memory;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::model::{User, UserField};
use crate::password::verify_password;
use crate::policy::PolicyRegistry;

pub use memory::{InMemoryInvitationStore, InMemorySessionIssuer, InMemoryUserDirectory, NullAuditSink,
                 RecordingAuditSink, RecordingNotificationSender, StaticCaptchaVerifier};

/// Fuente de verdad de usuarios.
pub trait UserDirectory: Send + Sync {
    fn find_by_field(&self, field: UserField, value: &str, case_insensitive: bool)
                     -> Result<Option<User>, ServiceError>;

    fn get(&self, id: Uuid) -> Result<Option<User>, ServiceError>;

    /// Crea o actualiza. Debe rechazar usernames duplicados con
    /// `ServiceError::Conflict`.
    fn save(&self, user: User) -> Result<User, ServiceError>;

    fn set_password(&self, id: Uuid, password: &str) -> Result<(), ServiceError>;

    fn delete(&self, id: Uuid) -> Result<(), ServiceError>;

    fn check_password(&self, user: &User, password: &str) -> Result<bool, ServiceError> {
        match &user.password_hash {
            Some(hash) => verify_password(password, hash),
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedSession {
    pub token: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Emite y revoca sesiones autenticadas.
pub trait SessionIssuer: Send + Sync {
    fn issue(&self, user: &User, duration: chrono::Duration) -> Result<AuthenticatedSession, ServiceError>;

    /// `Ok(false)` si el token no existía.
    fn revoke(&self, token: &str) -> Result<bool, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

pub trait NotificationSender: Send + Sync {
    fn send(&self, notification: &Notification) -> Result<(), ServiceError>;
}

pub trait CaptchaVerifier: Send + Sync {
    fn verify(&self, private_key: &str, response: &str, remote_addr: Option<&str>) -> Result<bool, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: Uuid,
    /// Datos fijos (objeto JSON) que se copian a `prompt_data`.
    pub fixed_data: Value,
    pub expires: Option<DateTime<Utc>>,
}

pub trait InvitationStore: Send + Sync {
    /// Consume la invitación; `None` si no existe o expiró.
    fn consume(&self, token: &str) -> Result<Option<Invitation>, ServiceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Login,
    LoginFailed,
    Logout,
    UserWrite,
    UserDelete,
    InvitationUsed,
    OtpDeviceCreated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub user: Option<Uuid>,
    pub username: Option<String>,
    pub remote_addr: Option<String>,
    pub detail: Value,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self { action,
               user: None,
               username: None,
               remote_addr: None,
               detail: Value::Null }
    }

    pub fn user(mut self, user: &User) -> Self {
        self.user = Some(user.id);
        self.username = Some(user.username.clone());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn remote_addr(mut self, remote_addr: Option<&str>) -> Self {
        self.remote_addr = remote_addr.map(str::to_owned);
        self
    }

    pub fn detail(mut self, detail: Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Destino de eventos de auditoría (y de reputación). Best-effort: no
/// devuelve error, las implementaciones registran sus propios fallos.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Colaboradores disponibles para todos los stages de un executor.
#[derive(Clone)]
pub struct StageServices {
    pub users: Arc<dyn UserDirectory>,
    pub sessions: Arc<dyn SessionIssuer>,
    pub notifications: Arc<dyn NotificationSender>,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub invitations: Arc<dyn InvitationStore>,
    pub audit: Arc<dyn AuditSink>,
    pub policies: PolicyRegistry,
}

impl StageServices {
    /// Builder con implementaciones en memoria por defecto.
    pub fn builder() -> StageServicesBuilder {
        StageServicesBuilder::default()
    }
}

impl std::fmt::Debug for StageServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageServices").field("policies", &self.policies).finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct StageServicesBuilder {
    users: Option<Arc<dyn UserDirectory>>,
    sessions: Option<Arc<dyn SessionIssuer>>,
    notifications: Option<Arc<dyn NotificationSender>>,
    captcha: Option<Arc<dyn CaptchaVerifier>>,
    invitations: Option<Arc<dyn InvitationStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    policies: PolicyRegistry,
}

impl StageServicesBuilder {
    pub fn users(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionIssuer>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn notifications(mut self, notifications: Arc<dyn NotificationSender>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn captcha(mut self, captcha: Arc<dyn CaptchaVerifier>) -> Self {
        self.captcha = Some(captcha);
        self
    }

    pub fn invitations(mut self, invitations: Arc<dyn InvitationStore>) -> Self {
        self.invitations = Some(invitations);
        self
    }

    pub fn audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn build(self) -> StageServices {
        StageServices { users: self.users.unwrap_or_else(|| Arc::new(InMemoryUserDirectory::new())),
                        sessions: self.sessions.unwrap_or_else(|| Arc::new(InMemorySessionIssuer::new())),
                        notifications: self.notifications
                                           .unwrap_or_else(|| Arc::new(RecordingNotificationSender::new())),
                        captcha: self.captcha.unwrap_or_else(|| Arc::new(StaticCaptchaVerifier::rejecting())),
                        invitations: self.invitations.unwrap_or_else(|| Arc::new(InMemoryInvitationStore::new())),
                        audit: self.audit.unwrap_or_else(|| Arc::new(NullAuditSink)),
                        policies: self.policies }
    }
}
