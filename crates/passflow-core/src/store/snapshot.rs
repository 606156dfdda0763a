use serde::{Deserialize, Serialize};

use crate::errors::StoreError;
use crate::model::FlowExecutionState;
use crate::plan::FlowPlan;
use crate::stage::{Stage, StagePrompt};

/// Unidad persistida: todo lo necesario para reanudar el flow sin volver a
/// ejecutar stages anteriores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
    pub state: FlowExecutionState,
    pub plan: FlowPlan,
    /// Último prompt mostrado; se reenvía junto con los reintentos.
    pub prompt: Option<StagePrompt>,
}

impl FlowSnapshot {
    pub fn current_stage(&self) -> Option<&Stage> {
        self.plan.stages.get(self.state.index)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, StoreError> {
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
