//! Builder para `FlowExecutor`.
//!
//! Todo componente es opcional: lo que no se configure se sustituye por su
//! versión en memoria. Producción normalmente sólo cambia `sessions`,
//! `events` y los colaboradores dentro de `services`.

use std::sync::Arc;

use super::FlowExecutor;
use crate::config::ExecutorConfig;
use crate::event::{EventStore, InMemoryEventStore};
use crate::plan::FlowPlanner;
use crate::services::StageServices;
use crate::store::{InMemorySessionStore, SessionStore};

#[derive(Default)]
pub struct FlowExecutorBuilder {
    sessions: Option<Arc<dyn SessionStore>>,
    events: Option<Arc<dyn EventStore>>,
    services: Option<StageServices>,
    config: ExecutorConfig,
}

impl FlowExecutorBuilder {
    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn events(mut self, events: Arc<dyn EventStore>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn services(mut self, services: StageServices) -> Self {
        self.services = Some(services);
        self
    }

    pub fn config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> FlowExecutor {
        FlowExecutor { sessions: self.sessions.unwrap_or_else(|| Arc::new(InMemorySessionStore::new())),
                       events: self.events.unwrap_or_else(|| Arc::new(InMemoryEventStore::new())),
                       services: self.services.unwrap_or_else(|| StageServices::builder().build()),
                       planner: FlowPlanner::new(),
                       config: self.config }
    }
}
