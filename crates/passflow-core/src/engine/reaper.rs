//! Expiración de flows inactivos y limpieza de snapshots terminales.
//!
//! El executor nunca expira flows por sí mismo; este componente lo ejecuta
//! un proceso externo (`passflow-cli reap`) de forma periódica.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::ExecutorConfig;
use crate::errors::{FlowError, StoreError};
use crate::event::{EventStore, FlowEventKind};
use crate::model::FlowStatus;
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapReport {
    /// Flows suspendidos pasados a `Expired`.
    pub expired: usize,
    /// Flows que otra request avanzó mientras se expiraban (se dejan intactos).
    pub conflicts: usize,
    /// Snapshots terminales eliminados.
    pub purged: usize,
}

pub struct FlowReaper {
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventStore>,
    config: ExecutorConfig,
}

fn cutoff(now: DateTime<Utc>, age: std::time::Duration) -> Result<DateTime<Utc>, FlowError> {
    Duration::from_std(age).ok()
                           .and_then(|d| now.checked_sub_signed(d))
                           .ok_or_else(|| FlowError::Internal(format!("invalid reaper window {age:?}")))
}

impl FlowReaper {
    pub fn new(sessions: Arc<dyn SessionStore>, events: Arc<dyn EventStore>, config: ExecutorConfig) -> Self {
        Self { sessions,
               events,
               config }
    }

    pub fn run_once(&self) -> Result<ReapReport, FlowError> {
        self.run_at(Utc::now())
    }

    /// Igual que `run_once` pero con un reloj explícito.
    pub fn run_at(&self, now: DateTime<Utc>) -> Result<ReapReport, FlowError> {
        let mut report = self.expire_idle(now)?;
        report.purged = self.sessions.purge_terminal(cutoff(now, self.config.terminal_retention())?)?;
        if report.expired > 0 || report.purged > 0 {
            info!("reaper pass expired={} conflicts={} purged={}",
                  report.expired,
                  report.conflicts,
                  report.purged);
        } else {
            debug!("reaper pass found nothing to do");
        }
        Ok(report)
    }

    fn expire_idle(&self, now: DateTime<Utc>) -> Result<ReapReport, FlowError> {
        let older_than = cutoff(now, self.config.session_idle_timeout())?;
        let idle = self.sessions.list_idle(FlowStatus::SuspendedWaitingInput, older_than)?;

        let mut report = ReapReport::default();
        for mut snapshot in idle {
            let expected = snapshot.state.version;
            let previous = snapshot.state.status;
            snapshot.state.status = FlowStatus::Expired;
            snapshot.state.version = expected + 1;
            snapshot.state.last_updated = now;
            snapshot.plan.context.clear();
            snapshot.prompt = None;

            match self.sessions.save(&snapshot, Some(expected)) {
                Ok(()) => {
                    report.expired += 1;
                    if let Err(e) = self.events
                                        .append_kind(snapshot.state.flow_instance, FlowEventKind::FlowExpired { previous })
                    {
                        warn!("expiry event not recorded flow={} err={e}", snapshot.state.flow_instance);
                    }
                }
                Err(StoreError::VersionConflict { .. }) | Err(StoreError::NotFound) => {
                    debug!("session changed while expiring, skipped session={}", snapshot.state.session_key);
                    report.conflicts += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(report)
    }
}
