use crate::capture::CapturedOutput;
use std::path::PathBuf;
use step_contracts::ContractError;
use thiserror::Error;

/// Failure reported by a [`ContainerEngine`](crate::engine::ContainerEngine) call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
    /// HTTP status returned by the engine API, when there was one.
    pub status: Option<u16>,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid step configuration: {message}")]
    Configuration { message: String },

    #[error("no usable container engine connection: {message}")]
    EngineConnection { message: String },

    #[error("failed to pull image {image}: {source}")]
    ImagePull { image: String, source: EngineError },

    #[error("failed to create container from image {image}: {source}")]
    ContainerCreate { image: String, source: EngineError },

    #[error("failed to start container {container_id}: {source}")]
    ContainerStart {
        container_id: String,
        source: EngineError,
    },

    #[error("container engine failed while {operation} container {container_id}: {source}")]
    Engine {
        operation: &'static str,
        container_id: String,
        source: EngineError,
    },

    #[error("container {container_id} exited with status {status}")]
    ContainerRuntime {
        container_id: String,
        status: i64,
        output: CapturedOutput,
    },

    #[error("no structured result found in {} lines of container output", output.len())]
    ResultNotFound { output: CapturedOutput },

    #[error("container result has an unexpected shape: {message}")]
    ResultSchema {
        message: String,
        output: Option<CapturedOutput>,
    },

    #[error("remote execution reported an error: {detail}")]
    RemoteExecution {
        detail: String,
        payload: serde_json::Value,
    },

    #[error("failed to prepare host directory {}: {source}", path.display())]
    HostDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ExecError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ExecError::Configuration {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExecError::Configuration { .. } => "STEP_EXEC_INVALID_CONFIG",
            ExecError::EngineConnection { .. } => "STEP_EXEC_ENGINE_CONNECTION",
            ExecError::ImagePull { .. } => "STEP_EXEC_IMAGE_PULL",
            ExecError::ContainerCreate { .. } => "STEP_EXEC_CONTAINER_CREATE",
            ExecError::ContainerStart { .. } => "STEP_EXEC_CONTAINER_START",
            ExecError::Engine { .. } => "STEP_EXEC_ENGINE_ERROR",
            ExecError::ContainerRuntime { .. } => "STEP_EXEC_CONTAINER_RUNTIME",
            ExecError::ResultNotFound { .. } => "STEP_EXEC_RESULT_NOT_FOUND",
            ExecError::ResultSchema { .. } => "STEP_EXEC_RESULT_SCHEMA",
            ExecError::RemoteExecution { .. } => "STEP_EXEC_REMOTE_ERROR",
            ExecError::HostDirectory { .. } => "STEP_EXEC_HOST_DIRECTORY",
        }
    }

    /// Container output captured before the failure, when the run got that far.
    pub fn output(&self) -> Option<&CapturedOutput> {
        match self {
            ExecError::ContainerRuntime { output, .. } | ExecError::ResultNotFound { output } => {
                Some(output)
            }
            ExecError::ResultSchema { output, .. } => output.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn with_output(self, captured: &CapturedOutput) -> Self {
        match self {
            ExecError::ResultSchema {
                message,
                output: None,
            } => ExecError::ResultSchema {
                message,
                output: Some(captured.clone()),
            },
            other => other,
        }
    }
}

impl From<ContractError> for ExecError {
    fn from(err: ContractError) -> Self {
        match err {
            ContractError::SchemaViolation { message } => ExecError::ResultSchema {
                message,
                output: None,
            },
            other => ExecError::Configuration {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_errors_map_to_configuration() {
        let err: ExecError = ContractError::InMemoryStorage.into();
        assert_eq!(err.code(), "STEP_EXEC_INVALID_CONFIG");
        assert!(err.to_string().contains("in-memory"));
    }

    #[test]
    fn runtime_error_carries_output() {
        let output = CapturedOutput::from_lines(["boom"]);
        let err = ExecError::ContainerRuntime {
            container_id: "abc".into(),
            status: 2,
            output,
        };
        assert_eq!(err.output().unwrap().lines(), ["boom"]);
        assert_eq!(err.to_string(), "container abc exited with status 2");
    }
}
