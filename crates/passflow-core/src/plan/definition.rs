//! Configuración de un flow: qué stages lo componen y bajo qué políticas.

use serde::{Deserialize, Serialize};

use crate::policy::{PolicyBinding, PolicyMode};
use crate::stage::Stage;

/// Propósito del flow. Determina qué resultado terminal espera el caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDesignation {
    Authentication,
    Authorization,
    Invalidation,
    Enrollment,
    Unenrollment,
    Recovery,
    /// Configuración de un stage por parte del propio usuario (p.ej. alta de
    /// un autenticador). Exige un usuario ya autenticado.
    StageSetup,
}

impl FlowDesignation {
    pub fn requires_authenticated_user(self) -> bool {
        matches!(self, FlowDesignation::StageSetup | FlowDesignation::Unenrollment)
    }
}

/// Un stage colocado en un flow, con sus propias políticas.
#[derive(Debug, Clone)]
pub struct FlowStageBinding {
    pub stage: Stage,
    pub order: i32,
    pub policy_mode: PolicyMode,
    pub bindings: Vec<PolicyBinding>,
}

impl FlowStageBinding {
    pub fn new(stage: Stage, order: i32) -> Self {
        Self { stage,
               order,
               policy_mode: PolicyMode::All,
               bindings: Vec::new() }
    }

    pub fn policy_mode(mut self, mode: PolicyMode) -> Self {
        self.policy_mode = mode;
        self
    }

    pub fn bind(mut self, binding: PolicyBinding) -> Self {
        self.bindings.push(binding);
        self
    }
}

#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub slug: String,
    pub name: String,
    pub designation: FlowDesignation,
    pub policy_mode: PolicyMode,
    pub bindings: Vec<PolicyBinding>,
    pub stages: Vec<FlowStageBinding>,
}

impl FlowDefinition {
    pub fn new(slug: impl Into<String>, designation: FlowDesignation) -> Self {
        let slug = slug.into();
        Self { name: slug.clone(),
               slug,
               designation,
               policy_mode: PolicyMode::All,
               bindings: Vec::new(),
               stages: Vec::new() }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn policy_mode(mut self, mode: PolicyMode) -> Self {
        self.policy_mode = mode;
        self
    }

    pub fn bind(mut self, binding: PolicyBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Añade un stage con `order` igual a su posición de inserción × 10.
    pub fn stage(mut self, stage: Stage) -> Self {
        let order = (self.stages.len() as i32) * 10;
        self.stages.push(FlowStageBinding::new(stage, order));
        self
    }

    pub fn stage_binding(mut self, binding: FlowStageBinding) -> Self {
        self.stages.push(binding);
        self
    }
}
