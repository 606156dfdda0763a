//! Configuración de la aplicación.
//!
//! Se lee del entorno (y de `.env`, cargado una sola vez) y se valida antes
//! de construir nada. No hay configuración global mutable: `AppConfig` se
//! pasa explícitamente a quien la necesita.

use std::env;

use once_cell::sync::Lazy;
use passflow_core::config::{DEFAULT_CREDENTIAL_MAX_ATTEMPTS, DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
                            DEFAULT_STAGE_TIMEOUT_MS, DEFAULT_TERMINAL_RETENTION_SECS};
use passflow_core::ExecutorConfig;
use thiserror::Error;

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
});

pub const DEFAULT_BCRYPT_COST: u32 = 12;
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub executor: ExecutorConfig,
    /// Coste bcrypt para contraseñas nuevas.
    pub bcrypt_cost: u32,
    pub reaper_interval_secs: u64,
    pub debug: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { executor: ExecutorConfig::default(),
               bcrypt_cost: DEFAULT_BCRYPT_COST,
               reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
               debug: false }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env` pero con una fuente de variables arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
        where F: Fn(&str) -> Option<String>
    {
        let executor = ExecutorConfig {
            session_idle_timeout_secs: parse(&lookup,
                                             "PASSFLOW_SESSION_IDLE_TIMEOUT_SECS",
                                             DEFAULT_SESSION_IDLE_TIMEOUT_SECS)?,
            default_stage_timeout_ms: parse(&lookup, "PASSFLOW_STAGE_TIMEOUT_MS", DEFAULT_STAGE_TIMEOUT_MS)?,
            credential_max_attempts: parse(&lookup,
                                           "PASSFLOW_CREDENTIAL_MAX_ATTEMPTS",
                                           DEFAULT_CREDENTIAL_MAX_ATTEMPTS)?,
            terminal_retention_secs: parse(&lookup,
                                           "PASSFLOW_TERMINAL_RETENTION_SECS",
                                           DEFAULT_TERMINAL_RETENTION_SECS)?,
        };
        let config = Self { executor,
                            bcrypt_cost: parse(&lookup, "PASSFLOW_BCRYPT_COST", DEFAULT_BCRYPT_COST)?,
                            reaper_interval_secs: parse(&lookup,
                                                        "PASSFLOW_REAPER_INTERVAL_SECS",
                                                        DEFAULT_REAPER_INTERVAL_SECS)?,
                            debug: flag(&lookup, "PASSFLOW_DEBUG")? };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // rango aceptado por bcrypt
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(invalid("PASSFLOW_BCRYPT_COST", self.bcrypt_cost, "must be between 4 and 31"));
        }
        if self.executor.credential_max_attempts == 0 {
            return Err(invalid("PASSFLOW_CREDENTIAL_MAX_ATTEMPTS", 0, "must be at least 1"));
        }
        if self.executor.default_stage_timeout_ms == 0 {
            return Err(invalid("PASSFLOW_STAGE_TIMEOUT_MS", 0, "must be positive"));
        }
        if self.executor.session_idle_timeout_secs == 0 {
            return Err(invalid("PASSFLOW_SESSION_IDLE_TIMEOUT_SECS", 0, "must be positive"));
        }
        Ok(())
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &'static str) -> ConfigError {
    ConfigError::Invalid { key,
                           value: value.to_string(),
                           reason }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
    where F: Fn(&str) -> Option<String>,
          T: std::str::FromStr
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, raw, "expected an integer")),
        None => Ok(default),
    }
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
    where F: Fn(&str) -> Option<String>
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(invalid(key, other, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        assert_eq!(config(&[]).expect("config"), AppConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[("PASSFLOW_STAGE_TIMEOUT_MS", "250"),
                           ("PASSFLOW_CREDENTIAL_MAX_ATTEMPTS", " 3 "),
                           ("PASSFLOW_DEBUG", "true")]).expect("config");
        assert_eq!(cfg.executor.default_stage_timeout_ms, 250);
        assert_eq!(cfg.executor.credential_max_attempts, 3);
        assert!(cfg.debug);
    }

    #[test]
    fn invalid_values_are_reported_with_their_key() {
        let err = config(&[("PASSFLOW_BCRYPT_COST", "abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PASSFLOW_BCRYPT_COST", .. }));
        let err = config(&[("PASSFLOW_BCRYPT_COST", "2")]).unwrap_err();
        assert_eq!(err.to_string(), "PASSFLOW_BCRYPT_COST: invalid value '2' (must be between 4 and 31)");
        assert!(config(&[("PASSFLOW_CREDENTIAL_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config(&[("PASSFLOW_DEBUG", "maybe")]).is_err());
    }
}
