#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use capsules_container_step::{
    ContainerEngine, ContainerSpec, EngineError, LogSource, LogStream, PullProgress,
};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use step_contracts::ExecutionRequest;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ImageExists(String),
    Pull(String),
    Create {
        spec: ContainerSpec,
        host_dir_exists: bool,
    },
    Start(String),
    Logs(String),
    Wait(String),
    Kill(String),
    Remove(String),
}

/// Scripted in-memory engine that records every call made against it.
pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    next_id: AtomicUsize,
    image_present: bool,
    pull_error: Option<String>,
    create_error: Option<String>,
    start_error: Option<String>,
    frames: Vec<(LogSource, Bytes)>,
    exit_status: i64,
    block_wait: bool,
    remove_error: Option<String>,
    stall_next_remove: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            image_present: true,
            pull_error: None,
            create_error: None,
            start_error: None,
            frames: Vec::new(),
            exit_status: 0,
            block_wait: false,
            remove_error: None,
            stall_next_remove: AtomicBool::new(false),
        }
    }

    /// Emits `lines` as output, split across chunk boundaries mid-line.
    pub fn with_output<S: AsRef<str>>(mut self, lines: &[S]) -> Self {
        let mut text = String::new();
        for line in lines {
            text.push_str(line.as_ref());
            text.push('\n');
        }
        let bytes = text.into_bytes();
        self.frames = bytes
            .chunks(7)
            .map(|chunk| (LogSource::Stdout, Bytes::copy_from_slice(chunk)))
            .collect();
        self
    }

    /// Emits raw frames exactly as given, in order.
    pub fn with_frames(mut self, frames: &[(LogSource, &str)]) -> Self {
        self.frames = frames
            .iter()
            .map(|(source, text)| (*source, Bytes::copy_from_slice(text.as_bytes())))
            .collect();
        self
    }

    pub fn exit_status(mut self, status: i64) -> Self {
        self.exit_status = status;
        self
    }

    pub fn image_missing(mut self) -> Self {
        self.image_present = false;
        self
    }

    pub fn pull_fails(mut self, message: &str) -> Self {
        self.pull_error = Some(message.to_string());
        self
    }

    pub fn create_fails(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn start_fails(mut self, message: &str) -> Self {
        self.start_error = Some(message.to_string());
        self
    }

    /// Never report an exit, as if the container hangs.
    pub fn hang(mut self) -> Self {
        self.block_wait = true;
        self
    }

    pub fn remove_fails(mut self, message: &str) -> Self {
        self.remove_error = Some(message.to_string());
        self
    }

    /// The first removal never completes; later ones behave normally.
    pub fn stall_first_remove(self) -> Self {
        self.stall_next_remove.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Create { spec, .. } => Some(spec),
                _ => None,
            })
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remove(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|call| matches(call)).count()
    }

    /// Polls until `matches` has been recorded or a second has passed.
    pub async fn wait_for(&self, matches: impl Fn(&Call) -> bool) -> bool {
        self.wait_for_count(1, matches).await
    }

    /// Polls until `matches` has been recorded at least `times` times.
    pub async fn wait_for_count(&self, times: usize, matches: impl Fn(&Call) -> bool) -> bool {
        for _ in 0..100 {
            if self.count(&matches) >= times {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        self.record(Call::ImageExists(image.to_string()));
        Ok(self.image_present)
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> PullProgress<'a> {
        self.record(Call::Pull(image.to_string()));
        let mut updates = vec![Ok("Pulling fs layer".to_string())];
        match &self.pull_error {
            Some(message) => updates.push(Err(EngineError::new(message.clone()))),
            None => updates.push(Ok("Download complete".to_string())),
        }
        stream::iter(updates).boxed()
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let host_dir_exists = spec
            .binds
            .last()
            .and_then(|bind| bind.split(':').next())
            .map(|host| Path::new(host).is_dir())
            .unwrap_or(false);
        self.record(Call::Create {
            spec: spec.clone(),
            host_dir_exists,
        });

        if let Some(message) = &self.create_error {
            return Err(EngineError::new(message.clone()).with_status(409));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{:064x}", id))
    }

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.record(Call::Start(container_id.to_string()));
        match &self.start_error {
            Some(message) => Err(EngineError::new(message.clone()).with_status(500)),
            None => Ok(()),
        }
    }

    fn logs<'a>(&'a self, container_id: &'a str) -> LogStream<'a> {
        self.record(Call::Logs(container_id.to_string()));
        stream::iter(self.frames.clone().into_iter().map(Ok)).boxed()
    }

    async fn wait_container(&self, container_id: &str) -> Result<i64, EngineError> {
        self.record(Call::Wait(container_id.to_string()));
        if self.block_wait {
            futures_util::future::pending::<()>().await;
        }
        Ok(self.exit_status)
    }

    async fn kill_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.record(Call::Kill(container_id.to_string()));
        Ok(())
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.record(Call::Remove(container_id.to_string()));
        if self.stall_next_remove.swap(false, Ordering::SeqCst) {
            futures_util::future::pending::<()>().await;
        }
        match &self.remove_error {
            Some(message) => Err(EngineError::new(message.clone()).with_status(500)),
            None => Ok(()),
        }
    }
}

pub fn request() -> ExecutionRequest {
    ExecutionRequest::builder("etl", "default")
        .run_id("run-1")
        .step("extract.compute")
        .execution_config(json!({
            "storage": {"filesystem": {}},
            "resources": {"warehouse": {"config": {"password": "hunter2"}}}
        }))
        .build()
        .unwrap()
}

pub fn success_response(nodes: Value) -> String {
    json!({
        "data": {"startPipelineExecution": {
            "__typename": "StartPipelineExecutionSuccess",
            "run": {"runId": "run-1", "logs": {"nodes": nodes}}
        }}
    })
    .to_string()
}

pub fn step_event(kind: &str, message: &str) -> Value {
    json!({
        "__typename": kind,
        "message": message,
        "level": "INFO",
        "step": {"key": "extract.compute"}
    })
}
