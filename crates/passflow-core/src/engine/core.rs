//! `FlowExecutor`: máquina de estados de un flow.
//!
//! Cada llamada pública corresponde a una request del caller y persiste el
//! snapshot exactamente una vez (al suspender o al llegar a un estado
//! terminal). Los stages que avanzan dentro de la misma request se encadenan
//! sin persistir estados intermedios.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use log::{debug, error, info, warn};
use uuid::Uuid;

use super::response::{CompletedFlow, FlowOutcome, FlowResponse};
use super::{FlowExecutorBuilder, FlowReaper};
use crate::config::ExecutorConfig;
use crate::constants::CTX_AUTHENTICATED_SESSION;
use crate::errors::{FlowError, StageError};
use crate::event::{EventStore, FlowEventKind};
use crate::model::{FlowExecutionState, FlowStatus};
use crate::plan::{FlowDefinition, FlowPlanner, FlowRequest};
use crate::services::{AuthenticatedSession, StageServices};
use crate::stage::{Stage, StageInput, StageRequest, StageVerdict};
use crate::store::{FlowSnapshot, SessionStore};

pub struct FlowExecutor {
    pub(super) sessions: Arc<dyn SessionStore>,
    pub(super) events: Arc<dyn EventStore>,
    pub(super) services: StageServices,
    pub(super) planner: FlowPlanner,
    pub(super) config: ExecutorConfig,
}

impl FlowExecutor {
    /// Builder con stores y colaboradores en memoria por defecto.
    pub fn builder() -> FlowExecutorBuilder {
        FlowExecutorBuilder::default()
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn services(&self) -> &StageServices {
        &self.services
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.sessions)
    }

    pub fn events(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.events)
    }

    /// Reaper que comparte stores y configuración con este executor.
    pub fn reaper(&self) -> FlowReaper {
        FlowReaper::new(Arc::clone(&self.sessions), Arc::clone(&self.events), self.config.clone())
    }

    /// Inicia `flow` para la sesión. Si la sesión ya tenía un flow, se
    /// reemplaza (la versión sigue creciendo).
    pub fn start(&self, session_key: &str, flow: &FlowDefinition, request: FlowRequest)
                 -> Result<FlowResponse, FlowError> {
        let previous = self.sessions.load(session_key)?;
        let expected = previous.as_ref().map(|s| s.state.version);
        let plan = self.planner.build(flow, &request)?;

        let mut state = FlowExecutionState::new(session_key, flow.slug.clone(), request.now);
        state.version = expected.unwrap_or(0);
        state.remote_addr = request.remote_addr.clone();
        state.request_user = request.user.as_ref().map(|u| u.id);
        info!("flow started flow={} instance={} stages={}",
              flow.slug,
              state.flow_instance,
              plan.stages.len());
        self.record(state.flow_instance,
                    FlowEventKind::FlowStarted { flow_slug: flow.slug.clone(),
                                                 fingerprint: plan.fingerprint.clone(),
                                                 stage_count: plan.stages.len() });

        let mut snapshot = FlowSnapshot { state,
                                          plan,
                                          prompt: None };
        if snapshot.plan.is_empty() {
            return self.complete(snapshot, expected);
        }
        snapshot.state.status = FlowStatus::InProgress;
        self.drive(snapshot, expected, None)
    }

    /// Ejecuta el stage actual con `input`. `expected_version` es la versión
    /// devuelta en la respuesta anterior.
    pub fn dispatch_current_stage(&self, session_key: &str, expected_version: u64, input: Option<StageInput>)
                                  -> Result<FlowResponse, FlowError> {
        let mut snapshot = self.load_active(session_key, expected_version)?;
        snapshot.state.status = FlowStatus::InProgress;
        self.drive(snapshot, Some(expected_version), input)
    }

    /// Cancelación explícita por parte del usuario.
    pub fn cancel(&self, session_key: &str, expected_version: u64, reason: &str) -> Result<FlowResponse, FlowError> {
        let snapshot = self.load_active(session_key, expected_version)?;
        self.finish_cancelled(snapshot, Some(expected_version), reason.to_string())
    }

    /// Snapshot persistido de la sesión, si existe.
    pub fn current(&self, session_key: &str) -> Result<Option<FlowSnapshot>, FlowError> {
        Ok(self.sessions.load(session_key)?)
    }

    fn load_active(&self, session_key: &str, expected_version: u64) -> Result<FlowSnapshot, FlowError> {
        let snapshot = self.sessions.load(session_key)?.ok_or(FlowError::NoActiveFlow)?;
        match snapshot.state.status {
            FlowStatus::Expired => return Err(FlowError::ExpiredFlow),
            status if status.is_terminal() => return Err(FlowError::FlowFinished(status)),
            _ => {}
        }
        if snapshot.state.version != expected_version {
            return Err(FlowError::StaleState { expected: expected_version,
                                               found: snapshot.state.version });
        }
        Ok(snapshot)
    }

    /// Despacha stages hasta que uno suspende o el flow termina.
    fn drive(&self, mut snapshot: FlowSnapshot, expected: Option<u64>, mut input: Option<StageInput>)
             -> Result<FlowResponse, FlowError> {
        if let Some(remote) = input.as_ref().and_then(|i| i.remote_addr.clone()) {
            snapshot.state.remote_addr = Some(remote);
        }
        loop {
            let Some(stage) = snapshot.current_stage().cloned() else {
                return self.complete(snapshot, expected);
            };
            let flow_id = snapshot.state.flow_instance;
            let index = snapshot.state.index;
            self.record(flow_id,
                        FlowEventKind::StageDispatched { index,
                                                         stage_id: stage.id.clone(),
                                                         with_input: input.is_some() });

            let verdict = self.run_stage(&stage, &snapshot, input.take());
            debug!("stage verdict flow={} stage={} verdict={}",
                   snapshot.state.flow_slug,
                   stage.id,
                   verdict.name());

            match verdict {
                StageVerdict::Advance(patch) => {
                    snapshot.plan.context.merge(patch);
                    if stage.kind.consumes_credentials() {
                        let purged = snapshot.plan.context.purge_sensitive();
                        if purged > 0 {
                            self.record(flow_id,
                                        FlowEventKind::ContextPurged { stage_id: stage.id.clone(),
                                                                       purged });
                        }
                    }
                    self.record(flow_id,
                                FlowEventKind::StageAdvanced { index,
                                                               stage_id: stage.id.clone() });
                    snapshot.state.index += 1;
                    snapshot.state.attempts = 0;
                    snapshot.prompt = None;
                }
                StageVerdict::Retry { message, patch } => {
                    snapshot.plan.context.merge(patch);
                    snapshot.state.attempts += 1;
                    let attempts = snapshot.state.attempts;
                    if let Some(max) = stage.effective_max_attempts(self.config.credential_max_attempts) {
                        if attempts > max {
                            let detail = format!("max attempts ({max}) exceeded: {message}");
                            return self.fail(snapshot, expected, Some(&stage), detail);
                        }
                    }
                    snapshot.state.status = FlowStatus::SuspendedWaitingInput;
                    self.record(flow_id,
                                FlowEventKind::StageRetried { index,
                                                              stage_id: stage.id.clone(),
                                                              attempts,
                                                              message: message.clone() });
                    let version = self.persist(&mut snapshot, expected)?;
                    let error = FlowError::RetriableStage { stage_id: stage.id,
                                                            message,
                                                            attempts };
                    return Ok(Self::respond(&snapshot,
                                            version,
                                            FlowOutcome::Retry { error,
                                                                 prompt: snapshot.prompt.clone() }));
                }
                StageVerdict::Suspend { prompt, patch } => {
                    snapshot.plan.context.merge(patch);
                    snapshot.state.status = FlowStatus::SuspendedWaitingInput;
                    snapshot.prompt = Some(prompt.clone());
                    self.record(flow_id,
                                FlowEventKind::StageSuspended { index,
                                                                stage_id: stage.id.clone() });
                    let version = self.persist(&mut snapshot, expected)?;
                    return Ok(Self::respond(&snapshot, version, FlowOutcome::Prompt(prompt)));
                }
                StageVerdict::Cancel(reason) => return self.finish_cancelled(snapshot, expected, reason),
                StageVerdict::Fatal(detail) => return self.fail(snapshot, expected, Some(&stage), detail),
            }
        }
    }

    /// Ejecuta el stage en un hilo propio para poder aplicar el timeout.
    /// Errores, panics y timeouts se convierten en veredictos.
    fn run_stage(&self, stage: &Stage, snapshot: &FlowSnapshot, input: Option<StageInput>) -> StageVerdict {
        let timeout = stage.timeout().unwrap_or_else(|| self.config.default_stage_timeout());
        let worker_stage = stage.clone();
        let services = self.services.clone();
        let context = snapshot.plan.context.clone();
        let remote_addr = snapshot.state.remote_addr.clone();
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new().name(format!("stage-{}", stage.id)).spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let request = StageRequest { services: &services,
                                             context: &context,
                                             remote_addr: remote_addr.as_deref(),
                                             now: Utc::now() };
                worker_stage.handle_input(&request, input.as_ref())
            }));
            // el receptor puede haberse ido por timeout
            let _ = tx.send(outcome);
        });
        if let Err(e) = spawned {
            return StageVerdict::Fatal(format!("could not spawn stage worker: {e}"));
        }

        match rx.recv_timeout(timeout) {
            Ok(Ok(Ok(verdict))) => verdict,
            Ok(Ok(Err(StageError::Retriable(message)))) => StageVerdict::retry(message),
            Ok(Ok(Err(e))) => StageVerdict::Fatal(e.to_string()),
            Ok(Err(payload)) => StageVerdict::Fatal(format!("stage panicked: {}", panic_message(payload.as_ref()))),
            Err(RecvTimeoutError::Timeout) => {
                warn!("stage timed out stage={} timeout_ms={}", stage.id, timeout.as_millis());
                StageVerdict::retry("stage timed out")
            }
            Err(RecvTimeoutError::Disconnected) => StageVerdict::Fatal("stage worker exited without a verdict".into()),
        }
    }

    fn complete(&self, mut snapshot: FlowSnapshot, expected: Option<u64>) -> Result<FlowResponse, FlowError> {
        let context = &snapshot.plan.context;
        let session = context.get(CTX_AUTHENTICATED_SESSION)
                             .and_then(|v| v.as_record())
                             .and_then(|v| serde_json::from_value::<AuthenticatedSession>(v.clone()).ok());
        let done = CompletedFlow { flow_slug: snapshot.plan.flow_slug.clone(),
                                   designation: snapshot.plan.designation,
                                   session,
                                   user: context.pending_user() };

        snapshot.state.status = FlowStatus::Completed;
        snapshot.plan.context.clear();
        snapshot.prompt = None;
        self.record(snapshot.state.flow_instance,
                    FlowEventKind::FlowCompleted { fingerprint: snapshot.plan.fingerprint.clone() });
        let version = self.persist(&mut snapshot, expected)?;
        info!("flow completed flow={} instance={}",
              snapshot.state.flow_slug,
              snapshot.state.flow_instance);
        Ok(Self::respond(&snapshot, version, FlowOutcome::Completed(done)))
    }

    fn finish_cancelled(&self, mut snapshot: FlowSnapshot, expected: Option<u64>, reason: String)
                        -> Result<FlowResponse, FlowError> {
        snapshot.state.status = FlowStatus::Cancelled;
        snapshot.plan.context.clear();
        snapshot.prompt = None;
        self.record(snapshot.state.flow_instance,
                    FlowEventKind::FlowCancelled { reason: reason.clone() });
        let version = self.persist(&mut snapshot, expected)?;
        info!("flow cancelled flow={} reason={reason}", snapshot.state.flow_slug);
        Ok(Self::respond(&snapshot, version, FlowOutcome::Cancelled { reason }))
    }

    /// El detalle sólo va al log; el caller recibe una referencia opaca.
    fn fail(&self, mut snapshot: FlowSnapshot, expected: Option<u64>, stage: Option<&Stage>, detail: String)
            -> Result<FlowResponse, FlowError> {
        let reference = Uuid::new_v4();
        let stage_id = stage.map(|s| s.id.clone());
        error!("flow failed reference={reference} flow={} instance={} stage={:?} detail={detail}",
               snapshot.state.flow_slug,
               snapshot.state.flow_instance,
               stage_id);

        snapshot.state.status = FlowStatus::Error;
        snapshot.plan.context.clear();
        snapshot.prompt = None;
        self.record(snapshot.state.flow_instance,
                    FlowEventKind::FlowFailed { stage_id, reference });
        let version = self.persist(&mut snapshot, expected)?;
        Ok(Self::respond(&snapshot,
                         version,
                         FlowOutcome::Failed { error: FlowError::FatalFlow { reference } }))
    }

    /// Guarda el snapshot con la versión siguiente a `expected`.
    fn persist(&self, snapshot: &mut FlowSnapshot, expected: Option<u64>) -> Result<u64, FlowError> {
        snapshot.state.version = expected.map_or(1, |v| v + 1);
        snapshot.state.last_updated = Utc::now();
        if let Err(e) = self.sessions.save(snapshot, expected) {
            warn!("snapshot not saved session={} err={e}", snapshot.state.session_key);
            return Err(e.into());
        }
        Ok(snapshot.state.version)
    }

    /// Best-effort: un fallo de la bitácora no interrumpe el flow.
    fn record(&self, flow_id: Uuid, kind: FlowEventKind) {
        let name = kind.name();
        if let Err(e) = self.events.append_kind(flow_id, kind) {
            warn!("event not recorded flow={flow_id} kind={name} err={e}");
        }
    }

    fn respond(snapshot: &FlowSnapshot, version: u64, outcome: FlowOutcome) -> FlowResponse {
        FlowResponse { session_key: snapshot.state.session_key.clone(),
                       flow_instance: snapshot.state.flow_instance,
                       version,
                       status: snapshot.state.status,
                       outcome }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}
