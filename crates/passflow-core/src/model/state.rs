//! Estado de ejecución de un flow.
//!
//! Las transiciones válidas son:
//! - `Pending` -> `InProgress`
//! - `InProgress` <-> `SuspendedWaitingInput`
//! - `InProgress` | `SuspendedWaitingInput` -> `Completed` | `Cancelled` | `Error`
//! - `SuspendedWaitingInput` -> `Expired` (sólo el reaper)
//!
//! Los estados terminales no admiten más transiciones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Pending,
    InProgress,
    SuspendedWaitingInput,
    Completed,
    Cancelled,
    Error,
    Expired,
}

impl FlowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self,
                 FlowStatus::Completed | FlowStatus::Cancelled | FlowStatus::Error | FlowStatus::Expired)
    }

    /// Nombre estable (minúsculas) usado por los backends persistentes.
    pub fn as_str(self) -> &'static str {
        match self {
            FlowStatus::Pending => "pending",
            FlowStatus::InProgress => "in_progress",
            FlowStatus::SuspendedWaitingInput => "suspended_waiting_input",
            FlowStatus::Completed => "completed",
            FlowStatus::Cancelled => "cancelled",
            FlowStatus::Error => "error",
            FlowStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let status = match s {
            "pending" => FlowStatus::Pending,
            "in_progress" => FlowStatus::InProgress,
            "suspended_waiting_input" => FlowStatus::SuspendedWaitingInput,
            "completed" => FlowStatus::Completed,
            "cancelled" => FlowStatus::Cancelled,
            "error" => FlowStatus::Error,
            "expired" => FlowStatus::Expired,
            _ => return None,
        };
        Some(status)
    }
}

/// Posición de la máquina de estados dentro de su `FlowPlan`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowExecutionState {
    /// Clave de sesión del caller (cookie, token...). Como mucho un flow
    /// activo por clave.
    pub session_key: String,
    /// Identificador de esta invocación; agrupa los eventos del flow.
    pub flow_instance: Uuid,
    pub flow_slug: String,
    /// Índice del stage actual dentro de `FlowPlan::stages`.
    pub index: usize,
    pub status: FlowStatus,
    /// Reintentos acumulados en el stage actual.
    pub attempts: u32,
    /// Token de concurrencia optimista; crece en cada persistencia.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Dirección remota de la request que inició el flow.
    pub remote_addr: Option<String>,
    /// Usuario ya autenticado al iniciar (flows de logout, setup...).
    pub request_user: Option<Uuid>,
}

impl FlowExecutionState {
    pub fn new(session_key: impl Into<String>, flow_slug: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self { session_key: session_key.into(),
               flow_instance: Uuid::new_v4(),
               flow_slug: flow_slug.into(),
               index: 0,
               status: FlowStatus::Pending,
               attempts: 0,
               version: 0,
               created_at: now,
               last_updated: now,
               remote_addr: None,
               request_user: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finished_statuses_are_terminal() {
        assert!(FlowStatus::Expired.is_terminal());
        assert!(FlowStatus::Completed.is_terminal());
        assert!(!FlowStatus::SuspendedWaitingInput.is_terminal());
        assert!(!FlowStatus::InProgress.is_terminal());
    }
}
