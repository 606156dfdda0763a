use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::FlowError;
use crate::model::FlowStatus;
use crate::plan::FlowDesignation;
use crate::services::AuthenticatedSession;
use crate::stage::StagePrompt;

/// Resultado terminal exitoso.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedFlow {
    pub flow_slug: String,
    pub designation: FlowDesignation,
    /// Sesión emitida por `UserLogin`, si el flow tenía uno.
    pub session: Option<AuthenticatedSession>,
    /// Usuario pendiente al terminar (el autenticado/creado).
    pub user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowOutcome {
    /// El flow espera input para el stage actual.
    Prompt(StagePrompt),
    /// Input rechazado. `error` es siempre `FlowError::RetriableStage`.
    Retry {
        error: FlowError,
        prompt: Option<StagePrompt>,
    },
    Completed(CompletedFlow),
    Cancelled {
        reason: String,
    },
    /// `error` es siempre `FlowError::FatalFlow`; el detalle sólo está en el log.
    Failed {
        error: FlowError,
    },
}

/// Respuesta de cada operación del executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowResponse {
    pub session_key: String,
    pub flow_instance: Uuid,
    /// Versión persistida; el caller la reenvía en el siguiente dispatch.
    pub version: u64,
    pub status: FlowStatus,
    pub outcome: FlowOutcome,
}

impl FlowResponse {
    pub fn prompt(&self) -> Option<&StagePrompt> {
        match &self.outcome {
            FlowOutcome::Prompt(prompt) => Some(prompt),
            FlowOutcome::Retry { prompt, .. } => prompt.as_ref(),
            _ => None,
        }
    }

    pub fn completed(&self) -> Option<&CompletedFlow> {
        match &self.outcome {
            FlowOutcome::Completed(done) => Some(done),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
