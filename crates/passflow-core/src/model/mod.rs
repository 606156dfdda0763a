//! Modelos de datos del motor: contexto, estado de ejecución y usuario.

pub mod context;
pub mod state;
pub mod user;

pub use context::{ContextEntry, ContextPatch, ContextStore, ContextValue};
pub use state::{FlowExecutionState, FlowStatus};
pub use user::{OtpAlgorithm, TotpDevice, User, UserField};
