//! passflow-core: motor de flujos de autenticación basado en stages.
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod event;
pub mod hashing;
pub mod model;
pub mod otp;
pub mod password;
pub mod plan;
pub mod policy;
pub mod services;
pub mod stage;
pub mod store;

pub use config::ExecutorConfig;
pub use engine::{CompletedFlow, FlowExecutor, FlowExecutorBuilder, FlowOutcome, FlowReaper, FlowResponse, ReapReport};
pub use errors::{classify_error, ErrorClass, FlowError, ServiceError, StageError, StoreError};
pub use event::{EventStore, FlowEvent, FlowEventKind, InMemoryEventStore};
pub use model::{ContextPatch, ContextStore, ContextValue, FlowExecutionState, FlowStatus, User, UserField};
pub use plan::{FlowDefinition, FlowDesignation, FlowPlan, FlowPlanner, FlowRequest, FlowStageBinding};
pub use policy::{Policy, PolicyBinding, PolicyEngine, PolicyError, PolicyMode, PolicyRegistry, PolicyRequest,
                 PolicyResult};
pub use services::{StageServices, StageServicesBuilder};
pub use stage::{PromptField, PromptFieldKind, Stage, StageInput, StageKind, StagePrompt, StageVerdict};
pub use store::{FlowSnapshot, InMemorySessionStore, SessionStore};
