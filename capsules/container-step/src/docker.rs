//! [`ContainerEngine`] backed by the Docker Engine API.

use crate::config::{parse_api_version, EngineConnection, ExecutorConfig};
use crate::container::ContainerSpec;
use crate::engine::{ContainerEngine, LogSource, LogStream, PullProgress};
use crate::error::{EngineError, ExecError};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::{ClientVersion, Docker, API_DEFAULT_VERSION};
use futures_util::StreamExt;
use tracing::{debug, info, instrument};

pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// Opens a connection as configured and checks that the engine answers.
    #[instrument(skip(config), fields(connection = ?config.connection))]
    pub async fn connect(config: &ExecutorConfig) -> Result<Self, ExecError> {
        let docker = match &config.connection {
            EngineConnection::Environment => Docker::connect_with_local_defaults()
                .map_err(|e| connection_error("environment", e))?
                .with_timeout(std::time::Duration::from_secs(config.connect_timeout_secs)),
            EngineConnection::Http { endpoint, .. } => {
                let version = client_version(&config.connection)?;
                Docker::connect_with_http(endpoint, config.connect_timeout_secs, &version)
                    .map_err(|e| connection_error(endpoint, e))?
            }
            EngineConnection::Tls { endpoint, .. } => {
                let tls = config.connection.tls_config().ok_or_else(|| {
                    ExecError::configuration("tls connection is missing its certificates")
                })?;
                let version = client_version(&config.connection)?;
                Docker::connect_with_ssl(
                    endpoint,
                    &tls.client_key,
                    &tls.client_cert,
                    &tls.ca_cert,
                    config.connect_timeout_secs,
                    &version,
                )
                .map_err(|e| connection_error(endpoint, e))?
            }
        };

        let version = docker
            .version()
            .await
            .map_err(|e| connection_error("engine version check", e))?;
        info!(
            engine_version = version.version.as_deref().unwrap_or("unknown"),
            api_version = version.api_version.as_deref().unwrap_or("unknown"),
            "connected to container engine"
        );

        Ok(Self::from_client(docker))
    }
}

fn client_version(connection: &EngineConnection) -> Result<ClientVersion, ExecError> {
    match connection.api_version() {
        Some(version) => {
            let (major_version, minor_version) = parse_api_version(version)?;
            Ok(ClientVersion {
                major_version,
                minor_version,
            })
        }
        None => Ok(API_DEFAULT_VERSION.clone()),
    }
}

fn connection_error(target: &str, err: bollard::errors::Error) -> ExecError {
    ExecError::EngineConnection {
        message: format!("{}: {}", target, err),
    }
}

fn engine_error(err: bollard::errors::Error) -> EngineError {
    match &err {
        bollard::errors::Error::DockerResponseServerError { status_code, .. } => {
            EngineError::new(err.to_string()).with_status(*status_code)
        }
        _ => EngineError::new(err.to_string()),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(err) => {
                let err = engine_error(err);
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(err)
                }
            }
        }
    }

    fn pull_image<'a>(&'a self, image: &'a str) -> PullProgress<'a> {
        let options = Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        });

        self.docker
            .create_image(options, None, None)
            .filter_map(|update| async move {
                match update {
                    Ok(info) => info.status.map(Ok),
                    Err(err) => Some(Err(engine_error(err))),
                }
            })
            .boxed()
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let host_config = HostConfig {
            binds: Some(spec.binds.clone()),
            network_mode: spec.network_mode.clone(),
            dns: (!spec.dns.is_empty()).then(|| spec.dns.clone()),
            dns_search: (!spec.dns_search.is_empty()).then(|| spec.dns_search.clone()),
            cpu_shares: Some(spec.resources.cpu_shares),
            memory: spec.resources.memory,
            shm_size: spec.resources.shm_size,
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            env: Some(spec.env_list()),
            user: spec.user.clone(),
            working_dir: spec.working_dir.clone(),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(engine_error)?;
        for warning in &response.warnings {
            debug!(container = %spec.name, warning = %warning, "engine warning on create");
        }
        Ok(response.id)
    }

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await
            .map_err(engine_error)
    }

    fn logs<'a>(&'a self, container_id: &'a str) -> LogStream<'a> {
        let options = Some(LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        });

        self.docker
            .logs(container_id, options)
            .map(|chunk| match chunk {
                Ok(LogOutput::StdErr { message }) => Ok((LogSource::Stderr, message)),
                // Console frames come from tty containers, which have a single stream.
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::Console { message })
                | Ok(LogOutput::StdIn { message }) => Ok((LogSource::Stdout, message)),
                Err(err) => Err(engine_error(err)),
            })
            .boxed()
    }

    async fn wait_container(&self, container_id: &str) -> Result<i64, EngineError> {
        let options = Some(WaitContainerOptions {
            condition: "not-running",
        });
        let mut stream = self.docker.wait_container(container_id, options);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // The engine reports a non-zero exit through the error channel.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(engine_error(err)),
            None => Err(EngineError::new(
                "wait stream ended without reporting an exit status",
            )),
        }
    }

    async fn kill_container(&self, container_id: &str) -> Result<(), EngineError> {
        self.docker
            .kill_container(container_id, None::<KillContainerOptions<String>>)
            .await
            .map_err(engine_error)
    }

    async fn remove_container(&self, container_id: &str) -> Result<(), EngineError> {
        let options = Some(RemoveContainerOptions {
            force: true,
            ..Default::default()
        });
        self.docker
            .remove_container(container_id, options)
            .await
            .map_err(engine_error)
    }
}
