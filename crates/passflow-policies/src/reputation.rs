//! Reputación por IP y por nombre de usuario.
//!
//! `ReputationStore` acumula un score entero por clave: cada login fallido
//! resta uno y cada login correcto suma uno. Se alimenta como `AuditSink`
//! del executor, así que los contadores se actualizan sin que los stages
//! sepan nada de reputación. Los incrementos usan la API `entry` de
//! `DashMap` y son atómicos por clave.

use std::sync::Arc;

use dashmap::DashMap;
use log::debug;
use passflow_core::services::{AuditAction, AuditEvent, AuditSink};
use passflow_core::{Policy, PolicyError, PolicyRequest, PolicyResult};
use serde_json::json;

/// Score a partir del cual (inclusive) se deniega.
pub const DEFAULT_REPUTATION_THRESHOLD: i64 = -5;

#[derive(Default)]
pub struct ReputationStore {
    ips: DashMap<String, i64>,
    usernames: DashMap<String, i64>,
    forward: Option<Arc<dyn AuditSink>>,
}

impl std::fmt::Debug for ReputationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReputationStore")
         .field("ips", &self.ips.len())
         .field("usernames", &self.usernames.len())
         .finish()
    }
}

impl ReputationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reenvía cada evento a otro sink después de actualizar los scores.
    pub fn forwarding_to(sink: Arc<dyn AuditSink>) -> Self {
        Self { forward: Some(sink),
               ..Self::default() }
    }

    pub fn adjust_ip(&self, ip: &str, delta: i64) -> i64 {
        adjust(&self.ips, ip, delta)
    }

    pub fn adjust_username(&self, username: &str, delta: i64) -> i64 {
        adjust(&self.usernames, username, delta)
    }

    pub fn ip_score(&self, ip: &str) -> i64 {
        self.ips.get(ip).map(|s| *s.value()).unwrap_or(0)
    }

    pub fn username_score(&self, username: &str) -> i64 {
        self.usernames.get(username).map(|s| *s.value()).unwrap_or(0)
    }
}

fn adjust(map: &DashMap<String, i64>, key: &str, delta: i64) -> i64 {
    let mut score = map.entry(key.to_string()).or_insert(0);
    *score = score.saturating_add(delta);
    *score
}

impl AuditSink for ReputationStore {
    fn record(&self, event: &AuditEvent) {
        let delta = match event.action {
            AuditAction::LoginFailed => -1,
            AuditAction::Login => 1,
            _ => 0,
        };
        if delta != 0 {
            if let Some(ip) = event.remote_addr.as_deref() {
                let score = self.adjust_ip(ip, delta);
                debug!("reputation ip={ip} score={score}");
            }
            if let Some(username) = event.username.as_deref() {
                let score = self.adjust_username(username, delta);
                debug!("reputation username={username} score={score}");
            }
        }
        if let Some(forward) = &self.forward {
            forward.record(event);
        }
    }
}

/// Deniega cuando el score de la IP o del usuario cae al umbral o por debajo.
#[derive(Debug, Clone)]
pub struct ReputationPolicy {
    name: String,
    store: Arc<ReputationStore>,
    check_ip: bool,
    check_username: bool,
    threshold: i64,
}

impl ReputationPolicy {
    pub fn new(name: impl Into<String>, store: Arc<ReputationStore>) -> Self {
        Self { name: name.into(),
               store,
               check_ip: true,
               check_username: true,
               threshold: DEFAULT_REPUTATION_THRESHOLD }
    }

    pub fn check_ip(mut self, enabled: bool) -> Self {
        self.check_ip = enabled;
        self
    }

    pub fn check_username(mut self, enabled: bool) -> Self {
        self.check_username = enabled;
        self
    }

    pub fn threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }
}

impl Policy for ReputationPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn passes(&self, request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
        let ip_score = match (self.check_ip, request.remote_addr) {
            (true, Some(ip)) => Some(self.store.ip_score(ip)),
            _ => None,
        };
        let username_score = match (self.check_username, request.user) {
            (true, Some(user)) => Some(self.store.username_score(&user.username)),
            _ => None,
        };
        let bad = [ip_score, username_score].into_iter().flatten().any(|s| s <= self.threshold);
        let data = json!({"ip_score": ip_score, "username_score": username_score});
        Ok(if bad {
               PolicyResult::fail("Too many failed attempts.").with_data(data)
           } else {
               PolicyResult::pass().with_data(data)
           })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passflow_core::services::RecordingAuditSink;
    use passflow_core::{ContextStore, User};

    fn failed(ip: &str, username: &str) -> AuditEvent {
        AuditEvent::new(AuditAction::LoginFailed).username(username).remote_addr(Some(ip))
    }

    #[test]
    fn failed_logins_lower_both_scores_and_logins_raise_them() {
        let store = ReputationStore::new();
        store.record(&failed("10.0.0.1", "alice"));
        store.record(&failed("10.0.0.1", "alice"));
        store.record(&AuditEvent::new(AuditAction::Login).username("alice").remote_addr(Some("10.0.0.1")));
        store.record(&AuditEvent::new(AuditAction::Logout).username("alice"));
        assert_eq!(store.ip_score("10.0.0.1"), -1);
        assert_eq!(store.username_score("alice"), -1);
        assert_eq!(store.ip_score("10.0.0.2"), 0);
    }

    #[test]
    fn policy_denies_at_threshold() {
        let store = Arc::new(ReputationStore::new());
        let policy = ReputationPolicy::new("reputation", store.clone()).threshold(-2);
        let ctx = ContextStore::new();
        let user = User::new("alice", "alice@example.com");
        let request = PolicyRequest::new(&ctx).with_user(Some(&user)).with_remote_addr(Some("10.0.0.1"));

        store.record(&failed("10.0.0.1", "bob"));
        assert!(policy.passes(&request).expect("eval").passing);
        store.record(&failed("10.0.0.1", "bob"));
        assert!(!policy.passes(&request).expect("eval").passing);

        // con el chequeo de IP desactivado sólo cuenta alice, que está limpia
        let by_user = ReputationPolicy::new("reputation", store).threshold(-2).check_ip(false);
        assert!(by_user.passes(&request).expect("eval").passing);
    }

    #[test]
    fn forwards_events() {
        let inner = Arc::new(RecordingAuditSink::new());
        let store = ReputationStore::forwarding_to(inner.clone());
        store.record(&failed("10.0.0.1", "alice"));
        assert_eq!(inner.events().len(), 1);
    }
}
