//! Locates the structured result in container output.
//!
//! The container prints exactly one start-execution response, but other writers
//! inside the container can interleave lines around it, so position is not
//! trusted. Every line (or run of lines) that decodes as a JSON object is a
//! candidate; the first candidate in arrival order that satisfies the response
//! schema wins.

use crate::capture::CapturedOutput;
use crate::error::ExecError;
use serde_json::Value;
use step_contracts::{ContractError, ResponseValidator};
use tracing::{debug, warn};

/// Upper bound on lines joined while reassembling one pretty-printed value.
const MAX_REASSEMBLED_LINES: usize = 512;

#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    value: Value,
    first_line: usize,
}

#[derive(Debug)]
pub struct ResultExtractor {
    validator: ResponseValidator,
}

impl ResultExtractor {
    pub fn new() -> Result<Self, ExecError> {
        Ok(Self {
            validator: ResponseValidator::new()?,
        })
    }

    pub fn extract(&self, output: &CapturedOutput) -> Result<Value, ExecError> {
        let mut chosen: Option<Candidate> = None;
        let mut rejected: Option<ContractError> = None;

        for candidate in json_objects(output.lines()) {
            match self.validator.validate(&candidate.value) {
                Ok(()) => match &chosen {
                    None => chosen = Some(candidate),
                    Some(first) if first.value != candidate.value => warn!(
                        kept_line = first.first_line,
                        ignored_line = candidate.first_line,
                        "container printed more than one structured result; keeping the first"
                    ),
                    Some(_) => {}
                },
                Err(err) if looks_like_response(&candidate.value) => {
                    debug!(line = candidate.first_line, error = %err, "malformed result candidate");
                    rejected.get_or_insert(err);
                }
                Err(_) => {
                    debug!(line = candidate.first_line, "ignoring unrelated JSON output");
                }
            }
        }

        match (chosen, rejected) {
            (Some(candidate), _) => {
                debug!(line = candidate.first_line, "found structured result");
                Ok(candidate.value)
            }
            (None, Some(err)) => Err(ExecError::from(err).with_output(output)),
            (None, None) => Err(ExecError::ResultNotFound {
                output: output.clone(),
            }),
        }
    }
}

/// Objects that carry one of the response's top-level keys are treated as
/// attempted results; anything else is log noise.
fn looks_like_response(value: &Value) -> bool {
    value.get("data").is_some() || value.get("errors").is_some()
}

fn json_objects(lines: &[String]) -> Vec<Candidate> {
    let mut candidates = Vec::new();
    let mut index = 0;

    while index < lines.len() {
        if !lines[index].starts_with('{') {
            index += 1;
            continue;
        }

        match reassemble(lines, index) {
            Some((value, last_line)) => {
                candidates.push(Candidate {
                    value,
                    first_line: index,
                });
                index = last_line + 1;
            }
            None => index += 1,
        }
    }

    candidates
}

/// Parses an object starting at `start`, pulling in following lines while the
/// text so far is an incomplete value.
fn reassemble(lines: &[String], start: usize) -> Option<(Value, usize)> {
    let mut text = lines[start].clone();
    let mut end = start;

    loop {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) if value.is_object() => return Some((value, end)),
            Ok(_) => return None,
            Err(err)
                if err.is_eof()
                    && end + 1 < lines.len()
                    && end - start + 1 < MAX_REASSEMBLED_LINES =>
            {
                end += 1;
                text.push('\n');
                text.push_str(&lines[end]);
            }
            Err(_) => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn success_line(run_id: &str) -> String {
        json!({
            "data": {"startPipelineExecution": {
                "__typename": "StartPipelineExecutionSuccess",
                "run": {"runId": run_id, "logs": {"nodes": []}}
            }}
        })
        .to_string()
    }

    #[test]
    fn finds_result_between_noise_lines() {
        let output = CapturedOutput::from_lines(vec![
            "2019-05-01 12:00:00 - dagster - INFO - starting".to_string(),
            "{\"level\": \"info\", \"msg\": \"structured log\"}".to_string(),
            success_line("r1"),
            "worker thread exiting".to_string(),
            "{not json".to_string(),
        ]);

        let extractor = ResultExtractor::new().unwrap();
        let value = extractor.extract(&output).unwrap();
        assert_eq!(
            value["data"]["startPipelineExecution"]["run"]["runId"],
            "r1"
        );
    }

    #[test]
    fn first_valid_result_wins() {
        let output =
            CapturedOutput::from_lines(vec![success_line("first"), success_line("second")]);
        let value = ResultExtractor::new().unwrap().extract(&output).unwrap();
        assert_eq!(
            value["data"]["startPipelineExecution"]["run"]["runId"],
            "first"
        );
    }

    #[test]
    fn reassembles_pretty_printed_result() {
        let pretty =
            serde_json::to_string_pretty(&json!({"errors": [{"message": "boom"}]})).unwrap();
        let mut lines = vec!["noise".to_string()];
        lines.extend(pretty.lines().map(|l| l.trim().to_string()));
        lines.push("trailing noise".to_string());

        let value = ResultExtractor::new()
            .unwrap()
            .extract(&CapturedOutput::from_lines(lines))
            .unwrap();
        assert_eq!(value["errors"][0]["message"], "boom");
    }

    #[test]
    fn no_json_is_result_not_found() {
        let output = CapturedOutput::from_lines(["hello", "world", "42", "[1, 2]"]);
        let err = ResultExtractor::new().unwrap().extract(&output).unwrap_err();
        assert!(matches!(err, ExecError::ResultNotFound { .. }));
        assert_eq!(err.output().unwrap().len(), 4);
    }

    #[test]
    fn unrelated_objects_only_is_result_not_found() {
        let output = CapturedOutput::from_lines(["{\"msg\": \"structured log\"}"]);
        let err = ResultExtractor::new().unwrap().extract(&output).unwrap_err();
        assert!(matches!(err, ExecError::ResultNotFound { .. }));
    }

    #[test]
    fn malformed_response_is_schema_error() {
        let output = CapturedOutput::from_lines([
            "{\"data\": {\"startPipelineExecution\": {\"run\": 7}}}",
        ]);
        let err = ResultExtractor::new().unwrap().extract(&output).unwrap_err();
        assert!(matches!(err, ExecError::ResultSchema { .. }));
        assert!(err.output().is_some());
    }
}
