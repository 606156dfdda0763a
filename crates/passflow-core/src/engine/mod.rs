//! Executor de flows: máquina de estados, builder y reaper.

pub mod builder;
pub mod core;
pub mod reaper;
pub mod response;

pub use builder::FlowExecutorBuilder;
pub use self::core::FlowExecutor;
pub use reaper::{FlowReaper, ReapReport};
pub use response::{CompletedFlow, FlowOutcome, FlowResponse};
