//! The seam between the lifecycle manager and a concrete container engine.

use crate::container::ContainerSpec;
use crate::error::EngineError;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

/// Which output stream of the container a log frame belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogSource {
    Stdout,
    Stderr,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Stdout => "stdout",
            LogSource::Stderr => "stderr",
        }
    }
}

/// Raw frames of a container's output, tagged with their stream, in arrival
/// order. A line written to one stream may span several frames with frames of
/// the other stream in between.
pub type LogStream<'a> = BoxStream<'a, Result<(LogSource, Bytes), EngineError>>;

/// Status updates reported while an image is pulled.
pub type PullProgress<'a> = BoxStream<'a, Result<String, EngineError>>;

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    fn pull_image<'a>(&'a self, image: &'a str) -> PullProgress<'a>;

    /// Creates the container and returns its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Follows the container's output until the engine ends the stream.
    fn logs<'a>(&'a self, container_id: &'a str) -> LogStream<'a>;

    /// Resolves with the exit status once the container stops running.
    async fn wait_container(&self, container_id: &str) -> Result<i64, EngineError>;

    async fn kill_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Force-removes the container.
    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError>;
}
