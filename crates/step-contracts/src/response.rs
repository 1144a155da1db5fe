use crate::events::ExecutionEvent;
use serde::{Deserialize, Serialize};

/// Top-level answer of the remote execution endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartExecutionResponse {
    #[serde(default)]
    pub data: Option<ResponseData>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQlError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    #[serde(default)]
    pub start_pipeline_execution: Option<StartExecutionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum StartExecutionResult {
    #[serde(rename = "StartPipelineExecutionSuccess")]
    Success { run: RunInfo },
    #[serde(rename = "PipelineConfigValidationInvalid")]
    ConfigValidationInvalid {
        #[serde(default)]
        errors: Vec<ConfigValidationError>,
    },
    #[serde(rename = "PipelineNotFoundError", rename_all = "camelCase")]
    PipelineNotFound {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        pipeline_name: Option<String>,
    },
    #[serde(rename = "PythonError")]
    RemoteFailure {
        message: String,
        #[serde(default)]
        stack: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub logs: RunLogs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLogs {
    #[serde(default)]
    pub nodes: Vec<ExecutionEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigValidationError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StartExecutionResult {
    pub fn type_name(&self) -> &'static str {
        match self {
            StartExecutionResult::Success { .. } => "StartPipelineExecutionSuccess",
            StartExecutionResult::ConfigValidationInvalid { .. } => {
                "PipelineConfigValidationInvalid"
            }
            StartExecutionResult::PipelineNotFound { .. } => "PipelineNotFoundError",
            StartExecutionResult::RemoteFailure { .. } => "PythonError",
        }
    }
}
