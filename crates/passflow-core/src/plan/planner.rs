//! `FlowPlanner`: convierte un `FlowDefinition` en el `FlowPlan` concreto
//! para una request.
//!
//! 1. Políticas del flow (modo del flow). Denegado → `FlowError::Denied`.
//! 2. Políticas de cada stage; los que no pasan se omiten.
//! 3. Orden por `order` (estable), nunca se reordena después.
//!
//! Determinista: mismas entradas, misma secuencia y mismo fingerprint.

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{FlowDefinition, FlowDesignation};
use crate::constants::{CTX_PENDING_USER, ENGINE_VERSION};
use crate::errors::FlowError;
use crate::hashing::hash_value;
use crate::model::{ContextStore, ContextValue, User};
use crate::policy::{PolicyEngine, PolicyRequest};
use crate::stage::Stage;

/// Datos de la request que inicia un flow.
#[derive(Debug, Clone)]
pub struct FlowRequest {
    /// Usuario ya autenticado (sesión previa), si lo hay.
    pub user: Option<User>,
    pub remote_addr: Option<String>,
    /// Contexto inicial (p.ej. token de invitación de la URL).
    pub context: ContextStore,
    pub now: DateTime<Utc>,
}

impl FlowRequest {
    pub fn new() -> Self {
        Self { user: None,
               remote_addr: None,
               context: ContextStore::new(),
               now: Utc::now() }
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: ContextValue) -> Self {
        self.context.set(key, value);
        self
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

impl Default for FlowRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Secuencia concreta de stages para una invocación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPlan {
    pub flow_slug: String,
    pub designation: FlowDesignation,
    pub stages: Vec<Stage>,
    pub context: ContextStore,
    pub fingerprint: String,
}

impl FlowPlan {
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_ids(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.id.as_str()).collect()
    }
}

/// Fingerprint del plan: blake3 del JSON canónico de slug + ids.
pub fn plan_fingerprint(flow_slug: &str, stages: &[Stage]) -> String {
    let ids: Vec<&str> = stages.iter().map(|s| s.id.as_str()).collect();
    hash_value(&json!({ "engine": ENGINE_VERSION, "flow": flow_slug, "stages": ids }))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlowPlanner;

impl FlowPlanner {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, flow: &FlowDefinition, request: &FlowRequest) -> Result<FlowPlan, FlowError> {
        if flow.designation.requires_authenticated_user() && request.user.is_none() {
            return Err(FlowError::Denied { messages: vec![format!("flow '{}' requires an authenticated user",
                                                                  flow.slug)] });
        }

        let policy_request = PolicyRequest::new(&request.context).with_user(request.user.as_ref())
                                                                 .with_remote_addr(request.remote_addr.as_deref())
                                                                 .at(request.now);

        let flow_result = PolicyEngine::new(flow.policy_mode).evaluate(&flow.bindings, &policy_request);
        if !flow_result.passing {
            debug!("flow denied by policy flow={} messages={:?}", flow.slug, flow_result.messages);
            return Err(FlowError::Denied { messages: flow_result.messages });
        }

        let mut ordered: Vec<_> = flow.stages.iter().collect();
        ordered.sort_by_key(|b| b.order);

        let mut stages = Vec::with_capacity(ordered.len());
        for binding in ordered {
            let result = PolicyEngine::new(binding.policy_mode).evaluate(&binding.bindings, &policy_request);
            if result.passing {
                stages.push(binding.stage.clone());
            } else {
                debug!("stage skipped by policy flow={} stage={}", flow.slug, binding.stage.id);
            }
        }

        let mut context = request.context.clone();
        if let Some(user) = &request.user {
            if !context.contains(CTX_PENDING_USER) {
                context.set(CTX_PENDING_USER, ContextValue::user(user.id));
            }
        }

        let fingerprint = plan_fingerprint(&flow.slug, &stages);
        Ok(FlowPlan { flow_slug: flow.slug.clone(),
                      designation: flow.designation,
                      stages,
                      context,
                      fingerprint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Policy, PolicyBinding, PolicyError, PolicyResult};
    use crate::stage::StageKind;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Gate(bool);

    impl Policy for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        fn passes(&self, _request: &PolicyRequest<'_>) -> Result<PolicyResult, PolicyError> {
            Ok(if self.0 { PolicyResult::pass() } else { PolicyResult::fail("gate closed") })
        }
    }

    fn flow() -> FlowDefinition {
        FlowDefinition::new("login", FlowDesignation::Authentication)
            .stage(Stage::new("ident", StageKind::Dummy))
            .stage_binding(super::super::FlowStageBinding::new(Stage::new("captcha", StageKind::Dummy), 5)
                               .bind(PolicyBinding::new(Arc::new(Gate(false)), 0)))
            .stage(Stage::new("password", StageKind::Password))
    }

    #[test]
    fn failing_stage_bindings_are_skipped_without_reordering() {
        let plan = FlowPlanner::new().build(&flow(), &FlowRequest::new()).expect("plan");
        assert_eq!(plan.stage_ids(), vec!["ident", "password"]);
    }

    #[test]
    fn planning_is_idempotent() {
        let request = FlowRequest::new();
        let a = FlowPlanner::new().build(&flow(), &request).expect("plan");
        let b = FlowPlanner::new().build(&flow(), &request).expect("plan");
        assert_eq!(a.stage_ids(), b.stage_ids());
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn flow_policy_denial_carries_messages() {
        let flow = flow().bind(PolicyBinding::new(Arc::new(Gate(false)), 0));
        let err = FlowPlanner::new().build(&flow, &FlowRequest::new()).unwrap_err();
        assert_eq!(err, FlowError::Denied { messages: vec!["gate closed".into()] });
    }

    #[test]
    fn stage_setup_requires_authenticated_user() {
        let flow = FlowDefinition::new("otp-setup", FlowDesignation::StageSetup);
        assert!(matches!(FlowPlanner::new().build(&flow, &FlowRequest::new()), Err(FlowError::Denied { .. })));

        let user = User::new("alice", "a@example.com");
        let plan = FlowPlanner::new().build(&flow, &FlowRequest::new().with_user(user.clone()))
                                     .expect("plan");
        assert_eq!(plan.context.pending_user(), Some(user.id));
    }
}
