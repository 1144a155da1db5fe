use serde::{Deserialize, Serialize};
use std::fmt;

/// Fields shared by every event the remote side reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stack: Vec<String>,
}

/// Event info plus the error the remote side attached to it, if any.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    #[serde(flatten)]
    pub info: EventInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

/// A typed execution event, discriminated by the GraphQL `__typename`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum ExecutionEvent {
    #[serde(rename = "PipelineStartEvent")]
    PipelineStart(EventInfo),
    #[serde(rename = "PipelineSuccessEvent")]
    PipelineSuccess(EventInfo),
    #[serde(rename = "PipelineFailureEvent")]
    PipelineFailure(EventInfo),
    #[serde(rename = "PipelineInitFailureEvent")]
    PipelineInitFailure(FailureInfo),
    #[serde(rename = "ExecutionStepStartEvent")]
    StepStart(EventInfo),
    #[serde(rename = "ExecutionStepSuccessEvent")]
    StepSuccess(EventInfo),
    #[serde(rename = "ExecutionStepFailureEvent")]
    StepFailure(FailureInfo),
    #[serde(rename = "ExecutionStepSkippedEvent")]
    StepSkipped(EventInfo),
    #[serde(rename = "ExecutionStepOutputEvent")]
    StepOutput(EventInfo),
    #[serde(rename = "StepMaterializationEvent")]
    StepMaterialization(EventInfo),
    #[serde(rename = "StepExpectationResultEvent")]
    StepExpectationResult(EventInfo),
    #[serde(rename = "EngineEvent")]
    Engine(FailureInfo),
    #[serde(rename = "LogMessageEvent")]
    LogMessage(EventInfo),
    /// A kind this crate does not know about yet.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PipelineStart,
    PipelineSuccess,
    PipelineFailure,
    PipelineInitFailure,
    StepStart,
    StepSuccess,
    StepFailure,
    StepSkipped,
    StepOutput,
    StepMaterialization,
    StepExpectationResult,
    Engine,
    LogMessage,
    Other,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PipelineStart => "pipeline-start",
            EventKind::PipelineSuccess => "pipeline-success",
            EventKind::PipelineFailure => "pipeline-failure",
            EventKind::PipelineInitFailure => "pipeline-init-failure",
            EventKind::StepStart => "step-start",
            EventKind::StepSuccess => "step-success",
            EventKind::StepFailure => "step-failure",
            EventKind::StepSkipped => "step-skipped",
            EventKind::StepOutput => "step-output",
            EventKind::StepMaterialization => "step-materialization",
            EventKind::StepExpectationResult => "step-expectation-result",
            EventKind::Engine => "engine-event",
            EventKind::LogMessage => "log-message",
            EventKind::Other => "other",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ExecutionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::PipelineStart(_) => EventKind::PipelineStart,
            ExecutionEvent::PipelineSuccess(_) => EventKind::PipelineSuccess,
            ExecutionEvent::PipelineFailure(_) => EventKind::PipelineFailure,
            ExecutionEvent::PipelineInitFailure(_) => EventKind::PipelineInitFailure,
            ExecutionEvent::StepStart(_) => EventKind::StepStart,
            ExecutionEvent::StepSuccess(_) => EventKind::StepSuccess,
            ExecutionEvent::StepFailure(_) => EventKind::StepFailure,
            ExecutionEvent::StepSkipped(_) => EventKind::StepSkipped,
            ExecutionEvent::StepOutput(_) => EventKind::StepOutput,
            ExecutionEvent::StepMaterialization(_) => EventKind::StepMaterialization,
            ExecutionEvent::StepExpectationResult(_) => EventKind::StepExpectationResult,
            ExecutionEvent::Engine(_) => EventKind::Engine,
            ExecutionEvent::LogMessage(_) => EventKind::LogMessage,
            ExecutionEvent::Other => EventKind::Other,
        }
    }

    pub fn info(&self) -> Option<&EventInfo> {
        match self {
            ExecutionEvent::PipelineStart(info)
            | ExecutionEvent::PipelineSuccess(info)
            | ExecutionEvent::PipelineFailure(info)
            | ExecutionEvent::StepStart(info)
            | ExecutionEvent::StepSuccess(info)
            | ExecutionEvent::StepSkipped(info)
            | ExecutionEvent::StepOutput(info)
            | ExecutionEvent::StepMaterialization(info)
            | ExecutionEvent::StepExpectationResult(info)
            | ExecutionEvent::LogMessage(info) => Some(info),
            ExecutionEvent::PipelineInitFailure(failure)
            | ExecutionEvent::StepFailure(failure)
            | ExecutionEvent::Engine(failure) => Some(&failure.info),
            ExecutionEvent::Other => None,
        }
    }

    pub fn step_key(&self) -> Option<&str> {
        self.info()
            .and_then(|info| info.step.as_ref())
            .map(|step| step.key.as_str())
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            ExecutionEvent::PipelineInitFailure(failure)
            | ExecutionEvent::StepFailure(failure)
            | ExecutionEvent::Engine(failure) => failure.error.as_ref(),
            _ => None,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, ExecutionEvent::StepSkipped(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_step_failure_with_error() {
        let event: ExecutionEvent = serde_json::from_value(json!({
            "__typename": "ExecutionStepFailureEvent",
            "message": "step blew up",
            "level": "ERROR",
            "step": {"key": "load.compute"},
            "error": {"message": "KeyError", "stack": ["line 1", "line 2"]}
        }))
        .unwrap();

        assert_eq!(event.kind(), EventKind::StepFailure);
        assert_eq!(event.step_key(), Some("load.compute"));
        assert_eq!(event.error().unwrap().stack.len(), 2);
    }

    #[test]
    fn unknown_typename_is_preserved_as_other() {
        let event: ExecutionEvent = serde_json::from_value(json!({
            "__typename": "ObjectStoreOperationEvent",
            "message": "wrote key"
        }))
        .unwrap();
        assert_eq!(event, ExecutionEvent::Other);
        assert!(event.info().is_none());
    }

    #[test]
    fn skipped_event_is_skip() {
        let event: ExecutionEvent = serde_json::from_value(json!({
            "__typename": "ExecutionStepSkippedEvent",
            "message": "skipped",
            "step": {"key": "a"}
        }))
        .unwrap();
        assert!(event.is_skip());
        assert_eq!(event.kind().to_string(), "step-skipped");
    }
}
