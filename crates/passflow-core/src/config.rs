//! Configuración explícita del executor.
//!
//! No hay settings globales: quien construye el executor pasa un
//! `ExecutorConfig` (la capa de aplicación lo lee del entorno).

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CREDENTIAL_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_TERMINAL_RETENTION_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Inactividad tras la cual el reaper expira un flow suspendido.
    pub session_idle_timeout_secs: u64,
    /// Timeout de un stage sin `timeout_ms` propio.
    pub default_stage_timeout_ms: u64,
    /// Reintentos permitidos en stages que protegen credenciales.
    pub credential_max_attempts: u32,
    /// Tiempo que se conservan los snapshots terminales antes de purgarlos.
    pub terminal_retention_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
               default_stage_timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
               credential_max_attempts: DEFAULT_CREDENTIAL_MAX_ATTEMPTS,
               terminal_retention_secs: DEFAULT_TERMINAL_RETENTION_SECS }
    }
}

impl ExecutorConfig {
    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    pub fn default_stage_timeout(&self) -> Duration {
        Duration::from_millis(self.default_stage_timeout_ms)
    }

    pub fn terminal_retention(&self) -> Duration {
        Duration::from_secs(self.terminal_retention_secs)
    }
}
