//! Ensamblado de una instancia completa del motor.
//!
//! `Passflow` junta el executor, los flows por defecto y los colaboradores
//! en memoria. La reputación se alimenta de la auditoría: el
//! `ReputationStore` es el sink del executor y reenvía al registro.

use std::collections::HashMap;
use std::sync::Arc;

use log::info;
use passflow_core::services::{InMemoryInvitationStore, InMemorySessionIssuer, InMemoryUserDirectory,
                              RecordingAuditSink, RecordingNotificationSender};
use passflow_core::{FlowDefinition, FlowExecutor, FlowRequest, FlowResponse, PolicyRegistry, StageInput,
                    StageServices};
use passflow_policies::{PasswordPolicy, ReputationStore};

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::flows::{default_flows, PASSWORD_COMPLEXITY_POLICY};

pub struct Passflow {
    executor: FlowExecutor,
    flows: HashMap<String, FlowDefinition>,
    pub users: Arc<InMemoryUserDirectory>,
    pub sessions: Arc<InMemorySessionIssuer>,
    pub notifications: Arc<RecordingNotificationSender>,
    pub invitations: Arc<InMemoryInvitationStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub reputation: Arc<ReputationStore>,
}

fn default_policies() -> PolicyRegistry {
    let mut registry = PolicyRegistry::new();
    registry.register(PASSWORD_COMPLEXITY_POLICY,
                      Arc::new(PasswordPolicy::new(PASSWORD_COMPLEXITY_POLICY).min_length(8)
                                                                              .uppercase(1)
                                                                              .lowercase(1)
                                                                              .message("Password must have at least 8 characters, \
                                                                                        one uppercase and one lowercase letter.")));
    registry
}

impl Passflow {
    /// Instancia con backends en memoria.
    pub fn in_memory(config: &AppConfig) -> Self {
        let users = Arc::new(InMemoryUserDirectory::with_hash_cost(config.bcrypt_cost));
        let sessions = Arc::new(InMemorySessionIssuer::new());
        let notifications = Arc::new(RecordingNotificationSender::new());
        let invitations = Arc::new(InMemoryInvitationStore::new());
        let audit = Arc::new(RecordingAuditSink::new());
        let reputation = Arc::new(ReputationStore::forwarding_to(audit.clone()));

        let services = StageServices::builder().users(users.clone())
                                               .sessions(sessions.clone())
                                               .notifications(notifications.clone())
                                               .invitations(invitations.clone())
                                               .audit(reputation.clone())
                                               .policies(default_policies())
                                               .build();
        let executor = FlowExecutor::builder().services(services)
                                              .config(config.executor.clone())
                                              .build();
        let flows = default_flows(Some(reputation.clone())).into_iter()
                                                           .map(|f| (f.slug.clone(), f))
                                                           .collect::<HashMap<_, _>>();
        info!("passflow ready flows={}", flows.len());
        Self { executor,
               flows,
               users,
               sessions,
               notifications,
               invitations,
               audit,
               reputation }
    }

    pub fn executor(&self) -> &FlowExecutor {
        &self.executor
    }

    pub fn flow(&self, slug: &str) -> Option<&FlowDefinition> {
        self.flows.get(slug)
    }

    /// Registra o reemplaza un flow.
    pub fn add_flow(&mut self, flow: FlowDefinition) {
        self.flows.insert(flow.slug.clone(), flow);
    }

    pub fn start(&self, session_key: &str, slug: &str, request: FlowRequest) -> Result<FlowResponse, AppError> {
        let flow = self.flow(slug).ok_or_else(|| AppError::UnknownFlow(slug.to_string()))?;
        Ok(self.executor.start(session_key, flow, request)?)
    }

    pub fn submit(&self, session_key: &str, version: u64, input: StageInput) -> Result<FlowResponse, AppError> {
        Ok(self.executor.dispatch_current_stage(session_key, version, Some(input))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flow_is_reported() {
        let app = Passflow::in_memory(&AppConfig { bcrypt_cost: 4,
                                                   ..AppConfig::default() });
        assert!(matches!(app.start("s", "nope", FlowRequest::new()), Err(AppError::UnknownFlow(_))));
        assert!(app.flow(crate::flows::DEFAULT_AUTHENTICATION).is_some());
    }
}
