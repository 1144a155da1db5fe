use crate::error::ExecError;
use step_contracts::{ExecutionRequest, START_EXECUTION_QUERY};
use tracing::info;

/// Produces the argv the step container is started with.
pub trait CommandStrategy: Send + Sync {
    fn command(&self, request: &ExecutionRequest) -> Result<Vec<String>, ExecError>;
}

/// Derives the command from the request: the start-execution query and its
/// variables, handed to the image's GraphQL client.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestCommand;

impl CommandStrategy for RequestCommand {
    fn command(&self, request: &ExecutionRequest) -> Result<Vec<String>, ExecError> {
        info!(
            pipeline = %request.pipeline_name,
            run_id = %request.run_id,
            "Executing start-execution query:\n{}\nwith variables:\n{}",
            START_EXECUTION_QUERY.trim_end(),
            request.redacted_log_line()
        );
        Ok(request.variables().command_args()?)
    }
}

/// A fixed command from configuration.
///
/// Text starting with `[` is read as a JSON array of arguments; anything else
/// is split using POSIX shell quoting rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiteralCommand {
    argv: Vec<String>,
}

impl LiteralCommand {
    pub fn parse(text: &str) -> Result<Self, ExecError> {
        let trimmed = text.trim();
        let argv = if trimmed.starts_with('[') {
            serde_json::from_str::<Vec<String>>(trimmed).map_err(|e| {
                ExecError::configuration(format!(
                    "command looks like a list but is not a JSON array of strings: {}",
                    e
                ))
            })?
        } else {
            shlex::split(trimmed).ok_or_else(|| {
                ExecError::configuration(format!("command has unbalanced quotes: {}", trimmed))
            })?
        };

        if argv.is_empty() {
            return Err(ExecError::configuration("command cannot be empty"));
        }
        Ok(Self { argv })
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl CommandStrategy for LiteralCommand {
    fn command(&self, _request: &ExecutionRequest) -> Result<Vec<String>, ExecError> {
        Ok(self.argv.clone())
    }
}
