//! Definición de flows y construcción de planes.

mod definition;
mod planner;

pub use definition::{FlowDefinition, FlowDesignation, FlowStageBinding};
pub use planner::{plan_fingerprint, FlowPlan, FlowPlanner, FlowRequest};
