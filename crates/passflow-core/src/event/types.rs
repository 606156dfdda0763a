//! Tipos de evento del executor y estructura `FlowEvent`.
//!
//! - Cada `flow_instance` tiene su propio stream, numerado desde 0.
//! - Los eventos son auditoría: el estado vive en el `FlowSnapshot`, no se
//!   reconstruye por replay.
//! - Nunca contienen valores sensibles del contexto, sólo claves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::FlowStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEventKind {
    /// Primer evento del stream. Fija el plan.
    FlowStarted {
        flow_slug: String,
        fingerprint: String,
        stage_count: usize,
    },
    StageDispatched {
        index: usize,
        stage_id: String,
        with_input: bool,
    },
    StageAdvanced {
        index: usize,
        stage_id: String,
    },
    StageRetried {
        index: usize,
        stage_id: String,
        attempts: u32,
        message: String,
    },
    StageSuspended {
        index: usize,
        stage_id: String,
    },
    /// Claves sensibles eliminadas tras un stage que consume credenciales.
    ContextPurged {
        stage_id: String,
        purged: usize,
    },
    FlowCompleted {
        fingerprint: String,
    },
    FlowCancelled {
        reason: String,
    },
    /// `reference` es el identificador opaco devuelto al caller.
    FlowFailed {
        stage_id: Option<String>,
        reference: Uuid,
    },
    FlowExpired {
        previous: FlowStatus,
    },
}

impl FlowEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            FlowEventKind::FlowStarted { .. } => "flow_started",
            FlowEventKind::StageDispatched { .. } => "stage_dispatched",
            FlowEventKind::StageAdvanced { .. } => "stage_advanced",
            FlowEventKind::StageRetried { .. } => "stage_retried",
            FlowEventKind::StageSuspended { .. } => "stage_suspended",
            FlowEventKind::ContextPurged { .. } => "context_purged",
            FlowEventKind::FlowCompleted { .. } => "flow_completed",
            FlowEventKind::FlowCancelled { .. } => "flow_cancelled",
            FlowEventKind::FlowFailed { .. } => "flow_failed",
            FlowEventKind::FlowExpired { .. } => "flow_expired",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowEvent {
    pub seq: u64, // asignado por el store (orden append)
    pub flow_id: Uuid,
    pub kind: FlowEventKind,
    pub ts: DateTime<Utc>,
}
