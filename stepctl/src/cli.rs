//! Command-line surface: turns flags and files into an executor config and a
//! step request.

use anyhow::{bail, Context, Result};
use capsules_container_step::{ContainerSettings, DefaultEnvironment, ExecutorConfig};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use step_contracts::ExecutionRequest;

/// Exit code reported when the remote side skipped the step.
pub const EXIT_SKIPPED: u8 = 3;

#[derive(Debug, Clone, Parser)]
#[command(name = "stepctl", version)]
#[command(about = "Runs one pipeline step in a container against the remote execution endpoint")]
pub struct Cli {
    /// Executor settings (YAML or JSON): engine connection and container settings
    #[arg(long, env = "STEPCTL_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Image to run; overrides the settings file
    #[arg(long, env = "STEPCTL_IMAGE")]
    pub image: Option<String>,

    /// Pull the image even when it is present locally
    #[arg(long, env = "STEPCTL_FORCE_PULL")]
    pub force_pull: bool,

    /// Mount this host directory instead of a per-run temp dir; it is never cleaned up
    #[arg(long, env = "STEPCTL_PERSISTENT_HOST_DIR", value_name = "DIR")]
    pub persistent_host_dir: Option<PathBuf>,

    /// Pipeline to execute
    #[arg(long, env = "STEPCTL_PIPELINE")]
    pub pipeline: String,

    /// Pipeline mode
    #[arg(long, env = "STEPCTL_MODE", default_value = "default")]
    pub mode: String,

    /// Run id assigned by the orchestrator; generated when absent
    #[arg(long, env = "STEPCTL_RUN_ID")]
    pub run_id: Option<String>,

    /// Step key to execute (repeatable); all steps when omitted
    #[arg(long = "step", value_name = "KEY")]
    pub steps: Vec<String>,

    /// Orchestrator timestamp (RFC 3339), attached to the run as tags
    #[arg(long, env = "STEPCTL_TIMESTAMP", value_parser = parse_timestamp)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Execution config document (YAML or JSON) sent to the remote side
    #[arg(long, env = "STEPCTL_EXECUTION_CONFIG", value_name = "FILE")]
    pub execution_config: PathBuf,
}

impl Cli {
    /// Settings file merged with command-line overrides and the process
    /// default environment.
    pub fn executor_config(&self) -> Result<ExecutorConfig> {
        let mut config = match &self.config {
            Some(path) => read_document::<ExecutorConfig>(path)?,
            None => match &self.image {
                Some(image) => ExecutorConfig::new(ContainerSettings::new(image.clone())),
                None => bail!("either --config or --image is required"),
            },
        };

        if let Some(image) = &self.image {
            config.container.image = image.clone();
        }
        if self.force_pull {
            config.container.force_pull = true;
        }
        if let Some(dir) = &self.persistent_host_dir {
            config.container.persistent_host_dir = Some(dir.clone());
        }

        DefaultEnvironment::from_process().apply_to(&mut config.container);
        Ok(config)
    }

    pub fn request(&self) -> Result<ExecutionRequest> {
        let execution_config = read_document::<Value>(&self.execution_config)?;

        let mut builder = ExecutionRequest::builder(&self.pipeline, &self.mode)
            .steps(&self.steps)
            .execution_config(execution_config);
        if let Some(run_id) = &self.run_id {
            builder = builder.run_id(run_id);
        }
        if let Some(timestamp) = self.timestamp {
            builder = builder.timestamp(timestamp);
        }

        builder.build().context("invalid step request")
    }
}

fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

/// Reads a YAML or JSON document; `.json` files are parsed strictly as JSON.
pub fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse JSON from {}", path.display()))
    } else {
        serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse YAML from {}", path.display()))
    }
}
