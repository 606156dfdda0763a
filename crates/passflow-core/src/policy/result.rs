use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resultado de evaluar una política. Inmutable una vez construido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyResult {
    pub passing: bool,
    pub messages: Vec<String>,
    pub data: Option<Value>,
}

impl PolicyResult {
    pub fn pass() -> Self {
        Self { passing: true,
               messages: Vec::new(),
               data: None }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self { passing: false,
               messages: vec![message.into()],
               data: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}
