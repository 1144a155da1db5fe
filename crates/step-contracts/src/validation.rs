use crate::error::ContractError;
use jsonschema::{Draft, JSONSchema};
use serde_json::Value;

const START_EXECUTION_RESPONSE_SCHEMA: &str =
    include_str!("../../../contracts/schemas/start-execution-response.json");

/// Structural check of a decoded response before it is mapped to events.
pub struct ResponseValidator {
    schema: JSONSchema,
}

impl ResponseValidator {
    pub fn new() -> Result<Self, ContractError> {
        let schema_value: Value = serde_json::from_str(START_EXECUTION_RESPONSE_SCHEMA).map_err(
            |e| ContractError::SchemaCompilation {
                message: format!("failed to parse response schema: {}", e),
            },
        )?;

        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema_value)
            .map_err(|e| ContractError::SchemaCompilation {
                message: e.to_string(),
            })?;

        Ok(Self { schema })
    }

    pub fn is_valid(&self, response: &Value) -> bool {
        self.schema.is_valid(response)
    }

    pub fn validate(&self, response: &Value) -> Result<(), ContractError> {
        if let Err(errors) = self.schema.validate(response) {
            let messages: Vec<String> = errors
                .map(|error| format!("{} at {}", error, error.instance_path))
                .collect();

            return Err(ContractError::SchemaViolation {
                message: messages.join(", "),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for ResponseValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseValidator").finish_non_exhaustive()
    }
}
