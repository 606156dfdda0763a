//! Demo: ejecuta un login completo contra la instancia en memoria.

use std::process::ExitCode;

use log::{error, info};
use passflow::flows::DEFAULT_AUTHENTICATION;
use passflow::{AppConfig, AppError, Passflow};
use passflow_core::{FlowOutcome, FlowRequest, FlowResponse, StageInput, User};
use tracing_subscriber::EnvFilter;

fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn describe(resp: &FlowResponse) -> String {
    match &resp.outcome {
        FlowOutcome::Prompt(prompt) => format!("prompt {} ({})", prompt.stage_id, prompt.component),
        FlowOutcome::Retry { error, .. } => format!("retry: {error}"),
        FlowOutcome::Completed(done) => format!("completed, session issued: {}", done.session.is_some()),
        FlowOutcome::Cancelled { reason } => format!("cancelled: {reason}"),
        FlowOutcome::Failed { error } => format!("failed: {error}"),
    }
}

fn run(config: &AppConfig) -> Result<(), AppError> {
    let app = Passflow::in_memory(config);
    app.users.insert_with_password(User::new("akadmin", "admin@example.com"), "Passw0rd!")?;

    let request = FlowRequest::new().with_remote_addr("127.0.0.1");
    let resp = app.start("demo-session", DEFAULT_AUTHENTICATION, request)?;
    info!("v{} {}", resp.version, describe(&resp));

    let steps = [StageInput::new().with("uid_field", "akadmin"),
                 StageInput::new().with("password", "wrong"),
                 StageInput::new().with("password", "Passw0rd!")];
    let mut resp = resp;
    for input in steps {
        resp = app.submit("demo-session", resp.version, input)?;
        info!("v{} {}", resp.version, describe(&resp));
    }

    let report = app.executor().reaper().run_once()?;
    info!("reaper expired={} purged={}", report.expired, report.purged);
    info!("reputation 127.0.0.1 score={}", app.reputation.ip_score("127.0.0.1"));
    Ok(())
}

fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };
    init_logging(config.debug);
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("demo failed: {e}");
            ExitCode::FAILURE
        }
    }
}
