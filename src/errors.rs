use passflow_core::{FlowError, ServiceError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errores de la capa de aplicación.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unknown flow '{0}'")]
    UnknownFlow(String),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Service(#[from] ServiceError),
}
