//! Caducidad de contraseña.
//!
//! Pasa mientras la contraseña del usuario tenga menos de `days` días. Si
//! caducó y no es `deny_only`, además de fallar marca el usuario en el
//! resultado (`data.password_expired`) para que el caller pueda forzar un
//! cambio de contraseña.

use chrono::Duration;
use passflow_core::{Policy, PolicyError, PolicyRequest, PolicyResult};
use serde_json::json;

#[derive(Debug, Clone)]
pub struct PasswordExpiryPolicy {
    name: String,
    days: i64,
    deny_only: bool,
}

impl PasswordExpiryPolicy {
    pub fn new(name: impl Into<String>, days: i64) -> Self {
        Self { name: name.into(),
               days,
               deny_only: false }
    }

    /// Sólo deniega; no propone el cambio de contraseña.
    pub fn deny_only(mut self) -> Self {
        self.deny_only = true;
        self
    }
}

impl Policy for PasswordExpiryPolicy {
    fn name(&self) -> &str {
        &self.name
    }

    fn passes(&self, request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
        let Some(user) = request.user else {
            return Ok(PolicyResult::fail("No user to check."));
        };
        let max_age = Duration::try_days(self.days)
            .ok_or_else(|| PolicyError::Execution(format!("invalid expiry window: {} days", self.days)))?;
        if request.now - user.password_changed < max_age {
            return Ok(PolicyResult::pass());
        }
        let result = PolicyResult::fail("Password has expired.");
        if self.deny_only {
            return Ok(result);
        }
        Ok(result.with_data(json!({"password_expired": true, "user": user.id})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use passflow_core::{ContextStore, User};

    fn user_changed_days_ago(days: i64) -> User {
        let mut user = User::new("alice", "alice@example.com");
        user.password_changed = Utc::now() - Duration::days(days);
        user
    }

    #[test]
    fn fresh_password_passes() {
        let ctx = ContextStore::new();
        let user = user_changed_days_ago(3);
        let policy = PasswordExpiryPolicy::new("expiry", 30);
        assert!(policy.passes(&PolicyRequest::new(&ctx).with_user(Some(&user))).expect("eval").passing);
    }

    #[test]
    fn expired_password_fails_and_flags_unless_deny_only() {
        let ctx = ContextStore::new();
        let user = user_changed_days_ago(40);
        let request = PolicyRequest::new(&ctx).with_user(Some(&user));

        let flagged = PasswordExpiryPolicy::new("expiry", 30).passes(&request).expect("eval");
        assert!(!flagged.passing);
        assert_eq!(flagged.data.as_ref().and_then(|d| d["password_expired"].as_bool()), Some(true));

        let denied = PasswordExpiryPolicy::new("expiry", 30).deny_only().passes(&request).expect("eval");
        assert!(!denied.passing);
        assert!(denied.data.is_none());
    }

    #[test]
    fn missing_user_fails() {
        let ctx = ContextStore::new();
        let result = PasswordExpiryPolicy::new("expiry", 30).passes(&PolicyRequest::new(&ctx)).expect("eval");
        assert!(!result.passing);
    }
}
