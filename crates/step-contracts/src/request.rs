use crate::error::ContractError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// GraphQL document sent to the remote execution endpoint.
pub const START_EXECUTION_QUERY: &str =
    include_str!("../../../contracts/queries/start-execution.graphql");

/// Placeholder substituted for the execution config in logged variables.
pub const REDACTED: &str = "REDACTED";

/// Storage backends whose results survive the container process.
pub const DURABLE_BACKENDS: [&str; 3] = ["filesystem", "s3", "gcs"];

const IN_MEMORY_BACKEND: &str = "in_memory";
const ORCHESTRATOR_TS_TAG: &str = "orchestrator_ts";
const EPOCH_TIME_TAG: &str = "execution_epoch_time";

/// One request to run a selection of pipeline steps on the remote endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub pipeline_name: String,
    pub mode: String,
    pub run_id: String,
    /// Ordered, de-duplicated step keys. Empty means every step.
    pub step_keys: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub execution_config: Value,
}

impl ExecutionRequest {
    pub fn builder(
        pipeline_name: impl Into<String>,
        mode: impl Into<String>,
    ) -> ExecutionRequestBuilder {
        ExecutionRequestBuilder::new(pipeline_name, mode)
    }

    /// Re-checks the invariants enforced by the builder. Useful for requests
    /// assembled by hand or deserialized from elsewhere.
    pub fn validate(&self) -> Result<(), ContractError> {
        if self.pipeline_name.trim().is_empty() {
            return Err(ContractError::EmptyPipelineName);
        }
        if self.mode.trim().is_empty() {
            return Err(ContractError::EmptyMode);
        }
        ensure_durable_storage(&self.execution_config)
    }

    /// Variables for the start-execution query, including the real config.
    pub fn variables(&self) -> ExecutionVariables {
        self.variables_with(self.execution_config.clone())
    }

    /// Variables with the execution config replaced by [`REDACTED`].
    pub fn redacted_variables(&self) -> ExecutionVariables {
        self.variables_with(Value::String(REDACTED.to_string()))
    }

    /// Pretty-printed redacted variables, for log output.
    pub fn redacted_log_line(&self) -> String {
        serde_json::to_string_pretty(&self.redacted_variables())
            .unwrap_or_else(|_| format!("{{\"executionParams\": \"{}\"}}", REDACTED))
    }

    fn variables_with(&self, environment_config_data: Value) -> ExecutionVariables {
        ExecutionVariables {
            execution_params: ExecutionParams {
                environment_config_data,
                mode: self.mode.clone(),
                selector: PipelineSelector {
                    name: self.pipeline_name.clone(),
                },
                execution_metadata: ExecutionMetadata {
                    run_id: self.run_id.clone(),
                    tags: self.timestamp.map(timestamp_tags).unwrap_or_default(),
                },
                step_keys: if self.step_keys.is_empty() {
                    None
                } else {
                    Some(self.step_keys.clone())
                },
            },
        }
    }
}

fn timestamp_tags(ts: DateTime<Utc>) -> Vec<ExecutionTag> {
    let epoch = ts.timestamp_micros() as f64 / 1_000_000.0;
    vec![
        ExecutionTag::new(ORCHESTRATOR_TS_TAG, ts.to_rfc3339()),
        ExecutionTag::new(EPOCH_TIME_TAG, format!("{:.6}", epoch)),
    ]
}

/// Checks that the execution config persists results somewhere durable.
pub fn ensure_durable_storage(execution_config: &Value) -> Result<(), ContractError> {
    let storage = execution_config
        .get("storage")
        .ok_or(ContractError::MissingStorage)?;

    let backends = storage
        .as_object()
        .ok_or_else(|| ContractError::InvalidStorage {
            found: json_kind(storage).to_string(),
        })?;

    if backends.contains_key(IN_MEMORY_BACKEND) {
        return Err(ContractError::InMemoryStorage);
    }

    if !backends
        .keys()
        .any(|name| DURABLE_BACKENDS.contains(&name.as_str()))
    {
        return Err(ContractError::NoDurableBackend {
            expected: DURABLE_BACKENDS.join(", "),
        });
    }

    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Fluent construction of an [`ExecutionRequest`].
#[derive(Debug, Clone)]
pub struct ExecutionRequestBuilder {
    pipeline_name: String,
    mode: String,
    run_id: Option<String>,
    step_keys: Vec<String>,
    timestamp: Option<DateTime<Utc>>,
    execution_config: Value,
}

impl ExecutionRequestBuilder {
    pub fn new(pipeline_name: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            mode: mode.into(),
            run_id: None,
            step_keys: Vec::new(),
            timestamp: None,
            execution_config: Value::Object(Default::default()),
        }
    }

    /// Run id assigned by the orchestrator. Blank ids are treated as absent.
    pub fn run_id(mut self, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        self.run_id = if run_id.trim().is_empty() {
            None
        } else {
            Some(run_id)
        };
        self
    }

    pub fn step(mut self, step_key: impl Into<String>) -> Self {
        let step_key = step_key.into();
        if !self.step_keys.contains(&step_key) {
            self.step_keys.push(step_key);
        }
        self
    }

    pub fn steps<I, S>(self, step_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        step_keys.into_iter().fold(self, |builder, key| builder.step(key))
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn execution_config(mut self, execution_config: Value) -> Self {
        self.execution_config = execution_config;
        self
    }

    pub fn build(self) -> Result<ExecutionRequest, ContractError> {
        let run_id = self.run_id.unwrap_or_else(|| {
            let generated = Uuid::new_v4().to_string();
            debug!(run_id = %generated, "no run id supplied; generated one");
            generated
        });

        let request = ExecutionRequest {
            pipeline_name: self.pipeline_name,
            mode: self.mode,
            run_id,
            step_keys: self.step_keys,
            timestamp: self.timestamp,
            execution_config: self.execution_config,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Variables of the start-execution query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionVariables {
    pub execution_params: ExecutionParams,
}

impl ExecutionVariables {
    pub fn to_json(&self) -> Result<String, ContractError> {
        serde_json::to_string(self).map_err(|e| ContractError::Serialization {
            message: e.to_string(),
        })
    }

    /// Argument vector for the in-container GraphQL client:
    /// `-v <variables> <query>`.
    pub fn command_args(&self) -> Result<Vec<String>, ContractError> {
        Ok(vec![
            "-v".to_string(),
            self.to_json()?,
            START_EXECUTION_QUERY.to_string(),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionParams {
    pub environment_config_data: Value,
    pub mode: String,
    pub selector: PipelineSelector,
    pub execution_metadata: ExecutionMetadata,
    #[serde(default)]
    pub step_keys: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSelector {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<ExecutionTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTag {
    pub key: String,
    pub value: String,
}

impl ExecutionTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
