//! # Step Contracts
//!
//! Wire contracts shared by the container step executor and the schedulers that
//! call it. A step invocation is described by an [`ExecutionRequest`]; the
//! request is rendered into the variables of the start-execution query and handed
//! to a container, which calls the remote execution endpoint and prints the
//! endpoint's answer. That answer is modelled by [`StartExecutionResponse`] and
//! checked against the bundled JSON schema with [`ResponseValidator`].
//!
//! ## Building a request
//!
//! ```rust
//! use step_contracts::ExecutionRequest;
//! use serde_json::json;
//!
//! let request = ExecutionRequest::builder("etl", "default")
//!     .run_id("run-42")
//!     .step("extract.compute")
//!     .step("load.compute")
//!     .execution_config(json!({"storage": {"filesystem": {}}}))
//!     .build()
//!     .expect("durable storage is configured");
//!
//! // Safe to log: the configuration is replaced by a placeholder.
//! let redacted = request.redacted_variables();
//! assert_eq!(redacted.execution_params.environment_config_data, json!("REDACTED"));
//! ```

mod error;
mod events;
mod request;
mod response;
mod validation;

pub use error::*;
pub use events::*;
pub use request::*;
pub use response::*;
pub use validation::*;
