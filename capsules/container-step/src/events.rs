//! Turns the extracted response into a step outcome.

use crate::error::ExecError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use step_contracts::{ExecutionEvent, StartExecutionResponse, StartExecutionResult};
use tracing::{debug, info};

/// How a step invocation that reached the remote side ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "events", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded(Vec<ExecutionEvent>),
    /// At least one event reported a skipped step. Callers must be able to
    /// tell this apart from success.
    Skipped(Vec<ExecutionEvent>),
}

impl StepOutcome {
    pub fn events(&self) -> &[ExecutionEvent] {
        match self {
            StepOutcome::Succeeded(events) | StepOutcome::Skipped(events) => events,
        }
    }

    pub fn into_events(self) -> Vec<ExecutionEvent> {
        match self {
            StepOutcome::Succeeded(events) | StepOutcome::Skipped(events) => events,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped(_))
    }
}

/// Maps a schema-valid response to the outcome of the step.
///
/// Top-level errors and every non-success start result fail with
/// [`ExecError::RemoteExecution`]; the raw response travels with the error.
pub fn map_response(response: Value) -> Result<StepOutcome, ExecError> {
    let decoded = match StartExecutionResponse::deserialize(&response) {
        Ok(decoded) => decoded,
        Err(err) => {
            return Err(ExecError::ResultSchema {
                message: format!("cannot decode start-execution response: {}", err),
                output: None,
            })
        }
    };

    if !decoded.errors.is_empty() {
        let detail = decoded
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ExecError::RemoteExecution {
            detail,
            payload: response,
        });
    }

    let Some(result) = decoded.data.and_then(|data| data.start_pipeline_execution) else {
        return Err(ExecError::ResultSchema {
            message: "response carries neither errors nor data.startPipelineExecution".into(),
            output: None,
        });
    };

    debug!(result = result.type_name(), "decoded start result");
    let events = match result {
        StartExecutionResult::Success { run } => {
            debug!(run_id = %run.run_id, events = run.logs.nodes.len(), "remote run finished");
            run.logs.nodes
        }
        StartExecutionResult::ConfigValidationInvalid { errors } => {
            let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
            return Err(ExecError::RemoteExecution {
                detail: format!("execution config is invalid: {}", messages.join("; ")),
                payload: response,
            });
        }
        StartExecutionResult::PipelineNotFound {
            message,
            pipeline_name,
        } => {
            let detail = match (message, pipeline_name) {
                (Some(message), _) => message,
                (None, Some(name)) => format!("pipeline '{}' not found", name),
                (None, None) => "pipeline not found".to_string(),
            };
            return Err(ExecError::RemoteExecution {
                detail,
                payload: response,
            });
        }
        StartExecutionResult::RemoteFailure { message, stack } => {
            let mut detail = message;
            if !stack.is_empty() {
                detail.push('\n');
                detail.push_str(stack.concat().trim_end());
            }
            return Err(ExecError::RemoteExecution {
                detail,
                payload: response,
            });
        }
    };

    for event in &events {
        debug!(
            kind = %event.kind(),
            step = event.step_key().unwrap_or("-"),
            "{}",
            event.info().map(|i| i.message.as_str()).unwrap_or_default()
        );
    }

    if let Some(skipped) = events.iter().find(|e| e.is_skip()) {
        info!(step = skipped.step_key().unwrap_or("-"), "remote side skipped the step");
        return Ok(StepOutcome::Skipped(events));
    }
    Ok(StepOutcome::Succeeded(events))
}
