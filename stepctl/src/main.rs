mod cli;

use anyhow::Result;
use capsules_container_step::{run_step, ExecError, ExecutorConfig, StepOutcome};
use clap::Parser;
use cli::{Cli, EXIT_SKIPPED};
use std::process::ExitCode;
use step_contracts::ExecutionRequest;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Lines of container output echoed to stderr when a step fails.
const FAILURE_TAIL_LINES: usize = 50;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let (config, request) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };

    info!(
        pipeline = %request.pipeline_name,
        run_id = %request.run_id,
        image = %config.container.image,
        "executing step"
    );

    match run_step(&config, &request).await {
        Ok(outcome) => report(&outcome),
        Err(err) => {
            report_failure(&err);
            ExitCode::FAILURE
        }
    }
}

fn prepare(cli: &Cli) -> Result<(ExecutorConfig, ExecutionRequest)> {
    Ok((cli.executor_config()?, cli.request()?))
}

fn report(outcome: &StepOutcome) -> ExitCode {
    match serde_json::to_string_pretty(outcome) {
        Ok(json) => println!("{}", json),
        Err(err) => {
            eprintln!("error: failed to serialize events: {}", err);
            return ExitCode::FAILURE;
        }
    }

    if outcome.is_skipped() {
        info!("step skipped");
        ExitCode::from(EXIT_SKIPPED)
    } else {
        info!(events = outcome.events().len(), "step succeeded");
        ExitCode::SUCCESS
    }
}

fn report_failure(err: &ExecError) {
    error!(code = err.code(), "{}", err);
    eprintln!("error[{}]: {}", err.code(), err);

    if let Some(output) = err.output() {
        if !output.is_empty() {
            let shown = FAILURE_TAIL_LINES.min(output.len());
            eprintln!("--- last {} lines of container output ---", shown);
            for line in output.tail(FAILURE_TAIL_LINES) {
                eprintln!("{}", line);
            }
        }
    }

    if let ExecError::RemoteExecution { payload, .. } = err {
        if let Ok(json) = serde_json::to_string_pretty(payload) {
            eprintln!("--- remote response ---\n{}", json);
        }
    }
}
