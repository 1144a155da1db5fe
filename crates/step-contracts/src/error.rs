use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("pipeline name cannot be empty")]
    EmptyPipelineName,

    #[error("mode cannot be empty")]
    EmptyMode,

    #[error(
        "execution config has no `storage` section; containerized steps need filesystem, s3 or gcs storage so results outlive the container"
    )]
    MissingStorage,

    #[error("execution config `storage` must be an object naming a backend, found {found}")]
    InvalidStorage { found: String },

    #[error(
        "in-memory storage cannot be used for containerized steps; use filesystem, s3 or gcs storage"
    )]
    InMemoryStorage,

    #[error("execution config `storage` names no durable backend (expected one of: {expected})")]
    NoDurableBackend { expected: String },

    #[error("failed to serialize execution variables: {message}")]
    Serialization { message: String },

    #[error("response schema failed to compile: {message}")]
    SchemaCompilation { message: String },

    #[error("response does not match the start-execution schema: {message}")]
    SchemaViolation { message: String },
}
