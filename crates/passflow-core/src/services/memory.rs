//! Colaboradores en memoria (tests, demo y despliegues de un solo proceso).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};
use rand::RngCore;
use serde_json::Value;
use uuid::Uuid;

use super::{AuditEvent, AuditSink, AuthenticatedSession, CaptchaVerifier, Invitation, InvitationStore,
            Notification, NotificationSender, SessionIssuer, UserDirectory};
use crate::errors::ServiceError;
use crate::model::{User, UserField};
use crate::password::hash_password;

/// Coste bcrypt por defecto (mismo valor que el de la librería).
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Un panic en otro hilo no invalida un Vec de registros.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct InMemoryUserDirectory {
    users: DashMap<Uuid, User>,
    hash_cost: u32,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::with_hash_cost(DEFAULT_HASH_COST)
    }

    pub fn with_hash_cost(hash_cost: u32) -> Self {
        Self { users: DashMap::new(),
               hash_cost }
    }

    /// Alta directa con contraseña en claro (seed de tests/demo).
    pub fn insert_with_password(&self, mut user: User, password: &str) -> Result<User, ServiceError> {
        user.password_hash = Some(hash_password(password, self.hash_cost)?);
        user.password_changed = Utc::now();
        self.save(user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for InMemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find_by_field(&self, field: UserField, value: &str, case_insensitive: bool)
                     -> Result<Option<User>, ServiceError> {
        let found = self.users.iter().find(|u| {
                                          let candidate = u.field(field);
                                          if case_insensitive {
                                              candidate.eq_ignore_ascii_case(value)
                                          } else {
                                              candidate == value
                                          }
                                      });
        Ok(found.map(|u| u.value().clone()))
    }

    fn get(&self, id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    fn save(&self, user: User) -> Result<User, ServiceError> {
        let taken = self.users
                        .iter()
                        .any(|u| u.id != user.id && u.username.eq_ignore_ascii_case(&user.username));
        if taken {
            return Err(ServiceError::Conflict(format!("username '{}' already exists", user.username)));
        }
        self.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn set_password(&self, id: Uuid, password: &str) -> Result<(), ServiceError> {
        let hash = hash_password(password, self.hash_cost)?;
        let mut user = self.users.get_mut(&id).ok_or_else(|| ServiceError::NotFound(format!("user {id}")))?;
        user.password_hash = Some(hash);
        user.password_changed = Utc::now();
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("user {id}")))
    }
}

/// Sesiones opacas: token aleatorio de 32 bytes en hex.
#[derive(Default)]
pub struct InMemorySessionIssuer {
    sessions: DashMap<String, AuthenticatedSession>,
}

impl InMemorySessionIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self, token: &str, at: DateTime<Utc>) -> bool {
        self.sessions.get(token).is_some_and(|s| s.expires_at > at)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionIssuer for InMemorySessionIssuer {
    fn issue(&self, user: &User, duration: chrono::Duration) -> Result<AuthenticatedSession, ServiceError> {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let issued_at = Utc::now();
        let session = AuthenticatedSession { token: hex::encode(raw),
                                             user_id: user.id,
                                             issued_at,
                                             expires_at: issued_at + duration };
        self.sessions.insert(session.token.clone(), session.clone());
        debug!("session issued user={}", user.id);
        Ok(session)
    }

    fn revoke(&self, token: &str) -> Result<bool, ServiceError> {
        Ok(self.sessions.remove(token).is_some())
    }
}

/// Guarda los mensajes en lugar de enviarlos. `fail_next` simula una caída
/// del relay para el siguiente envío.
#[derive(Default)]
pub struct RecordingNotificationSender {
    sent: Mutex<Vec<Notification>>,
    fail_next: AtomicBool,
}

impl RecordingNotificationSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        lock(&self.sent).clone()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl NotificationSender for RecordingNotificationSender {
    fn send(&self, notification: &Notification) -> Result<(), ServiceError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            warn!("notification relay unavailable to={}", notification.to);
            return Err(ServiceError::Unavailable("notification relay".into()));
        }
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptchaAnswer {
    Accept,
    Reject,
    Unavailable,
}

/// Verificador de respuesta fija.
#[derive(Debug, Clone, Copy)]
pub struct StaticCaptchaVerifier {
    answer: CaptchaAnswer,
}

impl StaticCaptchaVerifier {
    pub fn accepting() -> Self {
        Self { answer: CaptchaAnswer::Accept }
    }

    pub fn rejecting() -> Self {
        Self { answer: CaptchaAnswer::Reject }
    }

    pub fn unavailable() -> Self {
        Self { answer: CaptchaAnswer::Unavailable }
    }
}

impl CaptchaVerifier for StaticCaptchaVerifier {
    fn verify(&self, _private_key: &str, response: &str, _remote_addr: Option<&str>) -> Result<bool, ServiceError> {
        match self.answer {
            CaptchaAnswer::Accept => Ok(!response.is_empty()),
            CaptchaAnswer::Reject => Ok(false),
            CaptchaAnswer::Unavailable => Err(ServiceError::Unavailable("captcha provider".into())),
        }
    }
}

#[derive(Default)]
pub struct InMemoryInvitationStore {
    invitations: DashMap<String, Invitation>,
}

impl InMemoryInvitationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crea una invitación y devuelve su token.
    pub fn create(&self, fixed_data: Value, expires: Option<DateTime<Utc>>) -> String {
        let invitation = Invitation { id: Uuid::new_v4(),
                                      fixed_data,
                                      expires };
        let token = invitation.id.simple().to_string();
        self.invitations.insert(token.clone(), invitation);
        token
    }
}

impl InvitationStore for InMemoryInvitationStore {
    fn consume(&self, token: &str) -> Result<Option<Invitation>, ServiceError> {
        let Some((_, invitation)) = self.invitations.remove(token) else {
            return Ok(None);
        };
        if invitation.expires.is_some_and(|e| e <= Utc::now()) {
            debug!("invitation expired id={}", invitation.id);
            return Ok(None);
        }
        Ok(Some(invitation))
    }
}

/// Descarta todos los eventos.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        lock(&self.events).clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &AuditEvent) {
        lock(&self.events).push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames_are_unique_case_insensitively() {
        let dir = InMemoryUserDirectory::with_hash_cost(4);
        dir.save(User::new("alice", "a@example.com")).expect("first");
        let err = dir.save(User::new("ALICE", "b@example.com")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn invitations_are_single_use() {
        let store = InMemoryInvitationStore::new();
        let token = store.create(serde_json::json!({"username": "bob"}), None);
        assert!(store.consume(&token).expect("consume").is_some());
        assert!(store.consume(&token).expect("consume").is_none());
    }

    #[test]
    fn expired_invitations_are_rejected() {
        let store = InMemoryInvitationStore::new();
        let token = store.create(Value::Null, Some(Utc::now() - chrono::Duration::minutes(1)));
        assert!(store.consume(&token).expect("consume").is_none());
    }

    #[test]
    fn revoked_sessions_stop_being_active() {
        let issuer = InMemorySessionIssuer::new();
        let session = issuer.issue(&User::new("alice", "a@example.com"), chrono::Duration::hours(1))
                            .expect("issue");
        assert!(issuer.is_active(&session.token, Utc::now()));
        assert!(issuer.revoke(&session.token).expect("revoke"));
        assert!(!issuer.is_active(&session.token, Utc::now()));
    }
}
