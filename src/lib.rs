//! passflow
//!
//! Capa de aplicación sobre el motor de flujos:
//! - `config`: `AppConfig` leída del entorno.
//! - `flows`: blueprints de los flows por defecto.
//! - `app`: instancia ensamblada con colaboradores en memoria.

pub mod app;
pub mod config;
pub mod errors;
pub mod flows;

pub use app::Passflow;
pub use config::{AppConfig, ConfigError};
pub use errors::AppError;
