//! Image pull, container creation, start, run and teardown.

use crate::capture::{drain_logs, short_id, wait_for_exit, ExecutionResult};
use crate::container::ContainerSpec;
use crate::engine::ContainerEngine;
use crate::error::ExecError;
use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What happens to the container once the run is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownPolicy {
    /// Force-remove the container on every exit path.
    Remove,
    /// Leave the stopped container behind for inspection.
    Keep,
}

impl TeardownPolicy {
    pub fn from_auto_remove(auto_remove: bool) -> Self {
        if auto_remove {
            TeardownPolicy::Remove
        } else {
            TeardownPolicy::Keep
        }
    }
}

pub struct ContainerLifecycle {
    engine: Arc<dyn ContainerEngine>,
    force_pull: bool,
    teardown: TeardownPolicy,
}

impl ContainerLifecycle {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        force_pull: bool,
        teardown: TeardownPolicy,
    ) -> Self {
        Self {
            engine,
            force_pull,
            teardown,
        }
    }

    /// Pulls the image when it is missing locally or a pull is forced.
    #[instrument(skip(self))]
    pub async fn ensure_image(&self, image: &str) -> Result<(), ExecError> {
        let present = if self.force_pull {
            false
        } else {
            self.engine
                .image_exists(image)
                .await
                .map_err(|source| ExecError::ImagePull {
                    image: image.to_string(),
                    source,
                })?
        };

        if present {
            debug!(image, "image present locally");
            return Ok(());
        }

        info!(image, force_pull = self.force_pull, "Pulling image");
        let mut progress = self.engine.pull_image(image);
        while let Some(update) = progress.next().await {
            let status = update.map_err(|source| ExecError::ImagePull {
                image: image.to_string(),
                source,
            })?;
            info!(image, "{}", status);
        }
        Ok(())
    }

    pub async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, ExecError> {
        let id = self
            .engine
            .create_container(spec)
            .await
            .map_err(|source| ExecError::ContainerCreate {
                image: spec.image.clone(),
                source,
            })?;
        info!(
            container_id = %short_id(&id),
            name = %spec.name,
            image = %spec.image,
            "created container"
        );

        Ok(ContainerHandle {
            id,
            engine: Arc::clone(&self.engine),
            teardown: self.teardown,
            armed: true,
        })
    }

    /// Runs the container to completion: pull, create, start, then capture the
    /// output and the exit status concurrently. The container is torn down on
    /// every path according to the policy.
    pub async fn run(&self, spec: &ContainerSpec) -> Result<ExecutionResult, ExecError> {
        info!(image = %spec.image, "Starting container from image");
        self.ensure_image(&spec.image).await?;

        let container = self.create(spec).await?;
        let container_id = container.id().to_string();
        let outcome = self.start_and_collect(&container).await;
        container.teardown().await;

        let result = outcome?;
        if result.exit_status != 0 {
            warn!(
                container_id = %short_id(&container_id),
                status = result.exit_status,
                "container failed"
            );
            return Err(ExecError::ContainerRuntime {
                container_id,
                status: result.exit_status,
                output: result.output,
            });
        }
        Ok(result)
    }

    async fn start_and_collect(
        &self,
        container: &ContainerHandle,
    ) -> Result<ExecutionResult, ExecError> {
        let id = container.id();
        self.engine
            .start_container(id)
            .await
            .map_err(|source| ExecError::ContainerStart {
                container_id: id.to_string(),
                source,
            })?;
        debug!(container_id = %short_id(id), "container started");

        let engine = self.engine.as_ref();
        let (output, status) = tokio::join!(
            drain_logs(engine.logs(id), id),
            wait_for_exit(engine, id)
        );

        Ok(ExecutionResult {
            exit_status: status?,
            output: output?,
        })
    }
}

/// A created container. Dropping an armed handle (for example when the
/// invocation is aborted) schedules best-effort teardown on the runtime.
pub struct ContainerHandle {
    id: String,
    engine: Arc<dyn ContainerEngine>,
    teardown: TeardownPolicy,
    armed: bool,
}

impl ContainerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Applies the teardown policy after a run that reached a terminal state.
    /// Failures are logged; they never replace the run's own outcome.
    ///
    /// The handle stays armed until removal has returned, so an abort while
    /// removal is in flight still leaves the drop guard to clean up.
    pub async fn teardown(mut self) {
        match self.teardown {
            TeardownPolicy::Remove => {
                let removed = self.engine.remove_container(&self.id).await;
                self.armed = false;
                match removed {
                    Ok(()) => debug!(container_id = %short_id(&self.id), "removed container"),
                    Err(err) => warn!(
                        container_id = %short_id(&self.id),
                        error = %err,
                        "failed to remove container"
                    ),
                }
            }
            TeardownPolicy::Keep => {
                self.armed = false;
                debug!(
                    container_id = %short_id(&self.id),
                    "keeping container (auto remove disabled)"
                )
            }
        }
    }
}

impl Drop for ContainerHandle {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                container_id = %short_id(&self.id),
                "no runtime available to tear down abandoned container"
            );
            return;
        };

        let engine = Arc::clone(&self.engine);
        let id = self.id.clone();
        let teardown = self.teardown;
        runtime.spawn(async move {
            let result = match teardown {
                TeardownPolicy::Remove => engine.remove_container(&id).await,
                TeardownPolicy::Keep => engine.kill_container(&id).await,
            };
            match result {
                Ok(()) => info!(container_id = %short_id(&id), "tore down abandoned container"),
                Err(err) => warn!(
                    container_id = %short_id(&id),
                    error = %err,
                    "failed to tear down abandoned container"
                ),
            }
        });
    }
}
