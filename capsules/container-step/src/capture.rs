//! Log capture and exit wait for a running container.
//!
//! Both run against the same container handle and are joined by the lifecycle
//! manager; neither knows about the other.

use crate::engine::{ContainerEngine, LogSource, LogStream};
use crate::error::ExecError;
use futures_util::StreamExt;
use serde::Serialize;
use tracing::{debug, info};

/// Decoded container output, one entry per non-empty line, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapturedOutput {
    lines: Vec<String>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The last `count` lines, for error reports.
    pub fn tail(&self, count: usize) -> &[String] {
        let start = self.lines.len().saturating_sub(count);
        &self.lines[start..]
    }
}

/// Output of one finished container run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_status: i64,
    pub output: CapturedOutput,
}

/// Splits a byte stream into trimmed text lines.
///
/// Engine chunks do not respect line boundaries, so a partial trailing line is
/// held back until the next chunk (or the end of the stream) completes it.
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(line) = decode_line(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        decode_line(&raw)
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reads the container's output until the engine ends the stream, forwarding
/// every line to the log sink as it arrives.
///
/// Stdout and stderr are decoded separately so a frame of one stream landing
/// in the middle of a line of the other cannot split that line. Completed
/// lines of both streams are appended in the order they complete.
pub async fn drain_logs(
    mut stream: LogStream<'_>,
    container_id: &str,
) -> Result<CapturedOutput, ExecError> {
    let short_id = short_id(container_id);
    let mut stdout = LineDecoder::new();
    let mut stderr = LineDecoder::new();
    let mut output = CapturedOutput::new();

    while let Some(frame) = stream.next().await {
        let (source, chunk) = frame.map_err(|source| ExecError::Engine {
            operation: "reading logs of",
            container_id: container_id.to_string(),
            source,
        })?;
        let decoder = match source {
            LogSource::Stdout => &mut stdout,
            LogSource::Stderr => &mut stderr,
        };
        for line in decoder.feed(&chunk) {
            forward(short_id, source, &line);
            output.push(line);
        }
    }

    let pending = [(LogSource::Stdout, &mut stdout), (LogSource::Stderr, &mut stderr)];
    for (source, decoder) in pending {
        if let Some(line) = decoder.finish() {
            forward(short_id, source, &line);
            output.push(line);
        }
    }

    debug!(container = %short_id, lines = output.len(), "log stream ended");
    Ok(output)
}

fn forward(short_id: &str, source: LogSource, line: &str) {
    info!(
        target: "container_step::container",
        container = %short_id,
        stream = source.as_str(),
        "{}",
        line
    );
}

/// Blocks until the engine reports the container's exit status.
pub async fn wait_for_exit(
    engine: &dyn ContainerEngine,
    container_id: &str,
) -> Result<i64, ExecError> {
    let status = engine
        .wait_container(container_id)
        .await
        .map_err(|source| ExecError::Engine {
            operation: "waiting for",
            container_id: container_id.to_string(),
            source,
        })?;
    debug!(container = %short_id(container_id), status, "container exited");
    Ok(status)
}

pub(crate) fn short_id(container_id: &str) -> &str {
    container_id.get(..12).unwrap_or(container_id)
}
