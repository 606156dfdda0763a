//! passflow-policies: políticas concretas para el motor de flujos.
//!
//! Cada política implementa `passflow_core::Policy`. `PolicyConfig` es la
//! forma serializable de todas ellas: permite declarar bindings en JSON y
//! obtener un hash canónico de los parámetros para auditoría.

mod dummy;
mod expiry;
mod group;
mod password;
mod reputation;

use std::sync::Arc;

use passflow_core::hashing::{hash_str, to_canonical_json};
use passflow_core::Policy;
use serde::{Deserialize, Serialize};

pub use dummy::DummyPolicy;
pub use expiry::PasswordExpiryPolicy;
pub use group::GroupMembershipPolicy;
pub use password::PasswordPolicy;
pub use reputation::{ReputationPolicy, ReputationStore, DEFAULT_REPUTATION_THRESHOLD};

/// Parámetros declarativos de una política.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum PolicyConfig {
    Dummy {
        name: String,
        result: bool,
        #[serde(default)]
        wait_min_ms: u64,
        #[serde(default)]
        wait_max_ms: u64,
    },
    PasswordExpiry {
        name: String,
        days: i64,
        #[serde(default)]
        deny_only: bool,
    },
    Password(PasswordPolicy),
    GroupMembership { name: String, group: String },
    Reputation {
        name: String,
        #[serde(default = "enabled")]
        check_ip: bool,
        #[serde(default = "enabled")]
        check_username: bool,
        #[serde(default = "default_threshold")]
        threshold: i64,
    },
}

fn enabled() -> bool {
    true
}

fn default_threshold() -> i64 {
    DEFAULT_REPUTATION_THRESHOLD
}

impl PolicyConfig {
    /// Instancia la política. `Reputation` necesita el store compartido; si
    /// no se pasa, se usa uno vacío.
    pub fn build(&self, reputation: Option<&Arc<ReputationStore>>) -> Arc<dyn Policy> {
        match self.clone() {
            PolicyConfig::Dummy { name,
                                  result,
                                  wait_min_ms,
                                  wait_max_ms } => {
                Arc::new(DummyPolicy::new(name, result).with_wait(wait_min_ms, wait_max_ms))
            }
            PolicyConfig::PasswordExpiry { name, days, deny_only } => {
                let policy = PasswordExpiryPolicy::new(name, days);
                Arc::new(if deny_only { policy.deny_only() } else { policy })
            }
            PolicyConfig::Password(policy) => Arc::new(policy),
            PolicyConfig::GroupMembership { name, group } => Arc::new(GroupMembershipPolicy::new(name, group)),
            PolicyConfig::Reputation { name,
                                       check_ip,
                                       check_username,
                                       threshold } => {
                let store = reputation.cloned().unwrap_or_default();
                Arc::new(ReputationPolicy::new(name, store).check_ip(check_ip)
                                                           .check_username(check_username)
                                                           .threshold(threshold))
            }
        }
    }
}

/// Hash canónico de los parámetros de una política.
pub fn config_hash(config: &PolicyConfig) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(config)?;
    Ok(hash_str(&to_canonical_json(&value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use passflow_core::{ContextStore, PolicyRequest};

    #[test]
    fn config_deserializes_and_builds() {
        let config: PolicyConfig =
            serde_json::from_value(serde_json::json!({"policy": "dummy", "name": "always", "result": true}))
                .expect("decode");
        let policy = config.build(None);
        assert_eq!(policy.name(), "always");
        let ctx = ContextStore::new();
        assert!(policy.passes(&PolicyRequest::new(&ctx)).expect("eval").passing);
    }

    #[test]
    fn config_hash_is_stable_and_param_sensitive() {
        let a = PolicyConfig::PasswordExpiry { name: "expiry".into(),
                                               days: 30,
                                               deny_only: false };
        let b = PolicyConfig::PasswordExpiry { name: "expiry".into(),
                                               days: 31,
                                               deny_only: false };
        assert_eq!(config_hash(&a).expect("hash"), config_hash(&a.clone()).expect("hash"));
        assert_ne!(config_hash(&a).expect("hash"), config_hash(&b).expect("hash"));
    }

    #[test]
    fn reputation_config_defaults() {
        let config: PolicyConfig =
            serde_json::from_value(serde_json::json!({"policy": "reputation", "name": "rep"})).expect("decode");
        assert_eq!(config,
                   PolicyConfig::Reputation { name: "rep".into(),
                                              check_ip: true,
                                              check_username: true,
                                              threshold: DEFAULT_REPUTATION_THRESHOLD });
    }
}
