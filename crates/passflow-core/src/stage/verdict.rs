use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Stage;
use crate::model::{ContextPatch, ContextStore};
use crate::services::StageServices;

/// Lo que el caller debe mostrar mientras el flow espera input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagePrompt {
    pub stage_id: String,
    /// Componente de UI (nombre del tipo de stage).
    pub component: String,
    pub payload: Value,
}

impl StagePrompt {
    pub fn for_stage(stage: &Stage, payload: Value) -> Self {
        Self { stage_id: stage.id.clone(),
               component: stage.kind.name().to_string(),
               payload }
    }
}

/// Resultado de `Stage::handle_input`.
#[derive(Debug, Clone, PartialEq)]
pub enum StageVerdict {
    Advance(ContextPatch),
    /// Input rechazado; el mensaje se muestra al usuario. El patch se aplica
    /// igualmente (p.ej. descartar una credencial ya probada).
    Retry { message: String, patch: ContextPatch },
    /// Espera input. El patch permite guardar estado generado al mostrar el
    /// prompt (secretos OTP, tokens de email).
    Suspend { prompt: StagePrompt, patch: ContextPatch },
    Cancel(String),
    /// Fallo interno; el detalle sólo se registra en el log.
    Fatal(String),
}

impl StageVerdict {
    pub fn advance() -> Self {
        StageVerdict::Advance(ContextPatch::new())
    }

    pub fn suspend(prompt: StagePrompt) -> Self {
        StageVerdict::Suspend { prompt,
                                patch: ContextPatch::new() }
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Self::retry_with(message, ContextPatch::new())
    }

    pub fn retry_with(message: impl Into<String>, patch: ContextPatch) -> Self {
        StageVerdict::Retry { message: message.into(),
                              patch }
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        StageVerdict::Cancel(reason.into())
    }

    pub fn name(&self) -> &'static str {
        match self {
            StageVerdict::Advance(_) => "advance",
            StageVerdict::Retry { .. } => "retry",
            StageVerdict::Suspend { .. } => "suspend",
            StageVerdict::Cancel(_) => "cancel",
            StageVerdict::Fatal(_) => "fatal",
        }
    }
}

/// Input enviado por el usuario para el stage actual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageInput {
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub remote_addr: Option<String>,
}

impl StageInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn from_remote(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Valor string no vacío (recortado).
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Acepta booleanos JSON y las cadenas "true"/"on" de formularios.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.fields.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "on" | "1"),
            _ => false,
        }
    }
}

/// Todo lo que un stage puede leer durante `handle_input`.
pub struct StageRequest<'a> {
    pub services: &'a StageServices,
    pub context: &'a ContextStore,
    pub remote_addr: Option<&'a str>,
    pub now: DateTime<Utc>,
}
