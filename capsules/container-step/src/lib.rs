//! # Container Step Executor
//!
//! Runs one workflow step remotely by launching a short-lived container whose
//! entrypoint calls the remote execution endpoint. The container's output is
//! captured while it runs, the structured start-execution response is located
//! among the noise, and the response is turned into a [`StepOutcome`].
//!
//! The pieces line up as follows:
//!
//! - [`TempDirStrategy`] provides the host directory mounted at the container
//!   temp path (ephemeral per invocation, or caller-owned).
//! - [`CommandStrategy`] builds the container argv from the request.
//! - [`ContainerLifecycle`] pulls, creates, starts, drains logs and waits on a
//!   [`ContainerEngine`], then tears the container down.
//! - [`ResultExtractor`] finds the schema-valid response in the output.
//! - [`map_response`] turns the response into events or a remote error.
//!
//! [`StepExecutor`] wires them together; [`run_step`] additionally connects to
//! the engine described by an [`ExecutorConfig`].
//!
//! ```rust,no_run
//! use capsules_container_step::{run_step, ContainerSettings, ExecutorConfig};
//! use step_contracts::ExecutionRequest;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), capsules_container_step::ExecError> {
//! let config = ExecutorConfig::new(ContainerSettings::new("registry.local/etl:1.4"));
//! let request = ExecutionRequest::builder("etl", "default")
//!     .step("extract.compute")
//!     .execution_config(json!({"storage": {"s3": {"s3_bucket": "runs"}}}))
//!     .build()?;
//!
//! let outcome = run_step(&config, &request).await?;
//! println!("{} events, skipped: {}", outcome.events().len(), outcome.is_skipped());
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod command;
pub mod config;
pub mod container;
pub mod docker;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod extract;
pub mod lifecycle;
pub mod tempdir;

pub use capture::{CapturedOutput, ExecutionResult};
pub use command::{CommandStrategy, LiteralCommand, RequestCommand};
pub use config::{
    ByteSize, ContainerSettings, DefaultEnvironment, EngineConnection, ExecutorConfig, TlsConfig,
};
pub use container::{ContainerSpec, ResourceLimits};
pub use docker::DockerEngine;
pub use engine::{ContainerEngine, LogSource, LogStream, PullProgress};
pub use error::{EngineError, ExecError};
pub use events::{map_response, StepOutcome};
pub use executor::{run_step, StepExecutor};
pub use extract::ResultExtractor;
pub use lifecycle::{ContainerHandle, ContainerLifecycle, TeardownPolicy};
pub use tempdir::{EphemeralTempDir, HostDir, PersistentHostDir, TempDirStrategy};
