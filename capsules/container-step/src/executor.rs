//! One step invocation, end to end.

use crate::capture::short_id;
use crate::command::CommandStrategy;
use crate::config::{ContainerSettings, ExecutorConfig};
use crate::container::ContainerSpec;
use crate::docker::DockerEngine;
use crate::engine::ContainerEngine;
use crate::error::ExecError;
use crate::events::{map_response, StepOutcome};
use crate::extract::ResultExtractor;
use crate::lifecycle::{ContainerLifecycle, TeardownPolicy};
use crate::tempdir::TempDirStrategy;
use std::sync::Arc;
use std::time::Instant;
use step_contracts::ExecutionRequest;
use tracing::{info, instrument, warn};

/// Runs step invocations in containers on one engine.
///
/// Concurrent invocations share nothing but the engine client; each gets its
/// own container and host directory.
pub struct StepExecutor {
    engine: Arc<dyn ContainerEngine>,
    settings: ContainerSettings,
    temp_dirs: Arc<dyn TempDirStrategy>,
    command: Arc<dyn CommandStrategy>,
    extractor: ResultExtractor,
}

impl StepExecutor {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: ContainerSettings,
    ) -> Result<Self, ExecError> {
        settings.validate()?;
        Ok(Self {
            temp_dirs: settings.temp_dir_strategy(),
            command: settings.command_strategy()?,
            extractor: ResultExtractor::new()?,
            engine,
            settings,
        })
    }

    pub fn with_temp_dirs(mut self, temp_dirs: Arc<dyn TempDirStrategy>) -> Self {
        self.temp_dirs = temp_dirs;
        self
    }

    pub fn with_command(mut self, command: Arc<dyn CommandStrategy>) -> Self {
        self.command = command;
        self
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    /// Executes one step request in a fresh container.
    ///
    /// The request is checked before the engine is touched. The host directory
    /// is released and the container torn down whatever the outcome.
    #[instrument(
        skip(self, request),
        fields(pipeline = %request.pipeline_name, run_id = %request.run_id)
    )]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<StepOutcome, ExecError> {
        request.validate()?;
        let command = self.command.command(request)?;

        let started = Instant::now();
        let host_dir = self.temp_dirs.provision()?;
        let run = match ContainerSpec::assemble(&self.settings, command, host_dir.path()) {
            Ok(spec) => self.lifecycle().run(&spec).await,
            Err(err) => Err(err),
        };
        host_dir.release();

        let result = match run {
            Ok(result) => result,
            Err(err) => {
                if let ExecError::ContainerRuntime {
                    container_id,
                    status,
                    output,
                } = &err
                {
                    warn!(
                        container_id = %short_id(container_id),
                        status,
                        "container failed; last output:\n{}",
                        output.tail(20).join("\n")
                    );
                }
                return Err(err);
            }
        };

        let response = self
            .extractor
            .extract(&result.output)
            .map_err(|err| err.with_output(&result.output))?;
        let outcome = map_response(response).map_err(|err| err.with_output(&result.output))?;

        info!(
            events = outcome.events().len(),
            skipped = outcome.is_skipped(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "step finished"
        );
        Ok(outcome)
    }

    fn lifecycle(&self) -> ContainerLifecycle {
        ContainerLifecycle::new(
            Arc::clone(&self.engine),
            self.settings.force_pull,
            TeardownPolicy::from_auto_remove(self.settings.auto_remove),
        )
    }
}

/// Connects to the configured engine and executes `request`.
///
/// Configuration and request problems are reported before any connection is
/// attempted.
pub async fn run_step(
    config: &ExecutorConfig,
    request: &ExecutionRequest,
) -> Result<StepOutcome, ExecError> {
    config.validate()?;
    request.validate()?;

    let engine = DockerEngine::connect(config).await?;
    StepExecutor::new(Arc::new(engine), config.container.clone())?
        .execute(request)
        .await
}
