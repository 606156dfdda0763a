use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::PolicyResult;
use crate::model::{ContextStore, User};

/// Modo de combinación de los bindings de un flow o stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Todas deben pasar; corta en el primer fallo.
    #[default]
    All,
    /// Basta una; corta en el primer éxito.
    Any,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// Dependencia externa no disponible (p.ej. store de reputación).
    #[error("policy unavailable: {0}")]
    Unavailable(String),
    #[error("policy execution failed: {0}")]
    Execution(String),
}

/// Entrada de una evaluación de políticas.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub user: Option<&'a User>,
    pub context: &'a ContextStore,
    pub remote_addr: Option<&'a str>,
    pub now: DateTime<Utc>,
}

impl<'a> PolicyRequest<'a> {
    pub fn new(context: &'a ContextStore) -> Self {
        Self { user: None,
               context,
               remote_addr: None,
               now: Utc::now() }
    }

    pub fn with_user(mut self, user: Option<&'a User>) -> Self {
        self.user = user;
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: Option<&'a str>) -> Self {
        self.remote_addr = remote_addr;
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Regla booleana. Las implementaciones pueden tener efectos sobre stores
/// externos (reputación, auditoría) pero nunca sobre el `FlowPlan`.
pub trait Policy: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn passes(&self, request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError>;
}

/// Asociación de una política a un flow o stage.
#[derive(Debug, Clone)]
pub struct PolicyBinding {
    pub policy: Arc<dyn Policy>,
    /// Prioridad de evaluación (ascendente); empates por orden de inserción.
    pub order: i32,
    pub enabled: bool,
    /// Invierte el resultado de una evaluación exitosa.
    pub negate: bool,
    /// `true`: un error de ejecución cuenta como fallo. `false`: cuenta como
    /// éxito (escape explícito).
    pub fail_closed: bool,
}

impl PolicyBinding {
    pub fn new(policy: Arc<dyn Policy>, order: i32) -> Self {
        Self { policy,
               order,
               enabled: true,
               negate: false,
               fail_closed: true }
    }

    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_closed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
