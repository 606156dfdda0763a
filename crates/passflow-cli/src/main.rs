//! passflow-cli: operaciones sobre el backend Postgres.
//!
//! - `migrate`: aplica las migraciones embebidas.
//! - `reap`: expira flows suspendidos inactivos y purga snapshots terminales,
//!   una vez o cada `--every` segundos.
//! - `inspect --session <KEY>`: estado de una sesión (contexto redactado).
//! - `events --flow <UUID>`: event log de una instancia de flow, una línea
//!   JSON por evento.
//!
//! Códigos de salida: 0 ok, 4 no encontrado, 5 error de backend.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use passflow_core::store::SessionStore;
use passflow_core::{EventStore, ExecutorConfig, FlowError, FlowReaper};
use passflow_persistence::{build_dev_pool_from_env, migrations, PersistenceError, PgEventStore, PgPool,
                           PgSessionStore, PoolProvider};
use serde_json::json;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Intervalo por defecto entre pasadas del reaper (cada 5 minutos).
const DEFAULT_REAP_EVERY_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(name = "passflow-cli", version, about = "Operaciones sobre flows de autenticación persistidos")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aplica las migraciones pendientes.
    Migrate,
    /// Expira flows inactivos y purga snapshots terminales.
    Reap {
        /// Repite cada N segundos hasta Ctrl-C; sin valor corre una sola vez.
        #[arg(long, num_args = 0..=1, default_missing_value = "300", env = "PASSFLOW_REAPER_INTERVAL_SECS")]
        every: Option<u64>,
        #[arg(long, env = "PASSFLOW_SESSION_IDLE_TIMEOUT_SECS",
              default_value_t = passflow_core::config::DEFAULT_SESSION_IDLE_TIMEOUT_SECS)]
        idle_timeout_secs: u64,
        #[arg(long, env = "PASSFLOW_TERMINAL_RETENTION_SECS",
              default_value_t = passflow_core::config::DEFAULT_TERMINAL_RETENTION_SECS)]
        retention_secs: u64,
    },
    /// Muestra el estado persistido de una sesión.
    Inspect {
        #[arg(long)]
        session: String,
    },
    /// Lista los eventos de una instancia de flow.
    Events {
        #[arg(long)]
        flow: Uuid,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("worker task failed: {0}")]
    Task(String),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        match self {
            CliError::NotFound(_) => ExitCode::from(4),
            _ => ExitCode::from(5),
        }
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    passflow_persistence::init_dotenv();
    init_logging();
    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    }
}

async fn run(command: Command) -> Result<(), CliError> {
    let pool = build_dev_pool_from_env()?;
    match command {
        Command::Migrate => {
            let mut conn = pool.get().map_err(|e| PersistenceError::TransientIo(e.to_string()))?;
            let applied = migrations::run_pending_migrations(&mut conn)?;
            // build_pool ya aplica pendientes; aquí normalmente queda 0
            println!("migrations up to date (applied now: {applied})");
            Ok(())
        }
        Command::Reap { every,
                        idle_timeout_secs,
                        retention_secs, } => {
            let config = ExecutorConfig { session_idle_timeout_secs: idle_timeout_secs,
                                          terminal_retention_secs: retention_secs,
                                          ..ExecutorConfig::default() };
            let reaper = Arc::new(reaper(&pool, config));
            match every {
                None => reap_once(reaper).await,
                Some(secs) => reap_forever(reaper, Duration::from_secs(secs.max(1))).await,
            }
        }
        Command::Inspect { session } => inspect(&pool, &session),
        Command::Events { flow } => list_events(&pool, flow),
    }
}

fn reaper(pool: &PgPool, config: ExecutorConfig) -> FlowReaper {
    FlowReaper::new(Arc::new(PgSessionStore::new(PoolProvider::new(pool.clone()))),
                    Arc::new(PgEventStore::new(PoolProvider::new(pool.clone()))),
                    config)
}

async fn reap_once(reaper: Arc<FlowReaper>) -> Result<(), CliError> {
    let report = tokio::task::spawn_blocking(move || reaper.run_once()).await
                                                                       .map_err(|e| CliError::Task(e.to_string()))??;
    println!("{}", json!(report));
    Ok(())
}

async fn reap_forever(reaper: Arc<FlowReaper>, every: Duration) -> Result<(), CliError> {
    info!("reaper running every {}s", every.as_secs());
    let mut ticker = tokio::time::interval(every);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // una pasada fallida no detiene el loop; la siguiente reintenta
                if let Err(e) = reap_once(Arc::clone(&reaper)).await {
                    error!("reaper pass failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("reaper stopped");
                return Ok(());
            }
        }
    }
}

fn inspect(pool: &PgPool, session: &str) -> Result<(), CliError> {
    let store = PgSessionStore::new(PoolProvider::new(pool.clone()));
    let snapshot = store.load(session)
                        .map_err(FlowError::from)?
                        .ok_or_else(|| CliError::NotFound(format!("session '{session}'")))?;
    let view = json!({
        "state": snapshot.state,
        "stages": snapshot.plan.stage_ids(),
        "fingerprint": snapshot.plan.fingerprint,
        "context": snapshot.plan.context.public_view(),
        "prompt": snapshot.prompt,
    });
    println!("{view:#}");
    Ok(())
}

fn list_events(pool: &PgPool, flow: Uuid) -> Result<(), CliError> {
    let events = PgEventStore::new(PoolProvider::new(pool.clone())).list(flow)
                                                                   .map_err(FlowError::from)?;
    if events.is_empty() {
        return Err(CliError::NotFound(format!("flow {flow}")));
    }
    for event in events {
        println!("{}", json!(event));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reap_variants() {
        let cli = Cli::try_parse_from(["passflow-cli", "reap", "--every", "60"]).expect("parse");
        assert!(matches!(cli.command, Command::Reap { every: Some(60), .. }));

        let cli = Cli::try_parse_from(["passflow-cli", "reap", "--every"]).expect("parse");
        assert!(matches!(cli.command, Command::Reap { every: Some(DEFAULT_REAP_EVERY_SECS), .. }));
    }

    #[test]
    fn events_requires_a_uuid() {
        assert!(Cli::try_parse_from(["passflow-cli", "events", "--flow", "nope"]).is_err());
        let id = Uuid::new_v4().to_string();
        let cli = Cli::try_parse_from(["passflow-cli", "events", "--flow", id.as_str()]).expect("parse");
        assert!(matches!(cli.command, Command::Events { .. }));
    }
}
