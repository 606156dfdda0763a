//! Errores del core.
//!
//! `FlowError` es la taxonomía visible para el caller (capa web/API). Los
//! errores internos de stages (`StageError`) y colaboradores (`ServiceError`)
//! nunca escapan del executor: se mapean a un veredicto y, en última
//! instancia, a `FlowError::FatalFlow`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::model::FlowStatus;

#[derive(Debug, Error, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum FlowError {
    /// Una política de flow denegó la entrada. No reintentable sin cambiar
    /// las condiciones.
    #[error("flow denied: {}", messages.join("; "))]
    Denied { messages: Vec<String> },
    /// Input inválido o fallo transitorio; el usuario puede reenviar.
    #[error("stage '{stage_id}' rejected input (attempt {attempts}): {message}")]
    RetriableStage { stage_id: String, message: String, attempts: u32 },
    /// El flow terminó por un fallo interno. El detalle sólo va al log.
    #[error("flow failed (reference {reference})")]
    FatalFlow { reference: Uuid },
    /// Otra request avanzó la misma sesión primero.
    #[error("stale flow state: expected version {expected}, found {found}")]
    StaleState { expected: u64, found: u64 },
    /// La sesión superó el timeout de inactividad.
    #[error("flow expired")]
    ExpiredFlow,
    #[error("no active flow for session")]
    NoActiveFlow,
    #[error("flow already finished ({0:?})")]
    FlowFinished(FlowStatus),
    #[error("session store: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Clasificación gruesa para logging y para que la capa web decida qué
/// mostrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    Deny,
    Retriable,
    Fatal,
    Conflict,
    Expired,
}

pub fn classify_error(err: &FlowError) -> ErrorClass {
    match err {
        FlowError::Denied { .. } => ErrorClass::Deny,
        FlowError::RetriableStage { .. } => ErrorClass::Retriable,
        FlowError::StaleState { .. } => ErrorClass::Conflict,
        FlowError::ExpiredFlow | FlowError::NoActiveFlow | FlowError::FlowFinished(_) => ErrorClass::Expired,
        FlowError::FatalFlow { .. } | FlowError::Store(_) | FlowError::Internal(_) => ErrorClass::Fatal,
    }
}

/// Error de un colaborador externo (directorio, emisor de sesiones, email...).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
    #[error("{0}")]
    Other(String),
}

/// Error interno de un stage. El dispatcher lo convierte en veredicto.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StageError {
    /// Input del usuario rechazado; mensaje apto para el usuario final.
    #[error("{0}")]
    Retriable(String),
    /// Inconsistencia o dependencia caída; el detalle no se muestra.
    #[error("{0}")]
    Fatal(String),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Error del backend de sesiones.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("version conflict: expected {expected:?}, found {found}")]
    VersionConflict { expected: Option<u64>, found: u64 },
    #[error("not found")]
    NotFound,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("backend: {0}")]
    Backend(String),
}

impl From<StoreError> for FlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { expected, found } => FlowError::StaleState { expected: expected.unwrap_or(0),
                                                                                       found },
            StoreError::NotFound => FlowError::NoActiveFlow,
            other => FlowError::Store(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_conflict_maps_to_stale_state() {
        let err: FlowError = StoreError::VersionConflict { expected: Some(3), found: 4 }.into();
        assert_eq!(err, FlowError::StaleState { expected: 3, found: 4 });
        assert_eq!(classify_error(&err), ErrorClass::Conflict);
    }

    #[test]
    fn denied_message_joins_policy_messages() {
        let err = FlowError::Denied { messages: vec!["a".into(), "b".into()] };
        assert_eq!(err.to_string(), "flow denied: a; b");
    }
}
