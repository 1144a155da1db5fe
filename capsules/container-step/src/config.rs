use crate::command::{CommandStrategy, LiteralCommand, RequestCommand};
use crate::error::ExecError;
use crate::tempdir::{EphemeralTempDir, PersistentHostDir, TempDirStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// In-container path the host temp dir is mounted at, unless overridden.
pub const DEFAULT_CONTAINER_TMP_DIR: &str = "/tmp";

/// Environment variable through which the container learns its temp dir.
pub const TMP_DIR_ENV: &str = "STEP_TMP_DIR";

/// Process variables forwarded to the container when the settings name no
/// environment of their own.
pub const DEFAULT_ENV_KEYS: [&str; 2] = ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY"];

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 120;

/// Everything needed to run one containerized step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    #[serde(default)]
    pub connection: EngineConnection,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    pub container: ContainerSettings,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl ExecutorConfig {
    pub fn new(container: ContainerSettings) -> Self {
        Self {
            connection: EngineConnection::default(),
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            container,
        }
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        self.connection.validate()?;
        self.container.validate()
    }
}

/// How to reach the container engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EngineConnection {
    /// Discover the engine from `DOCKER_HOST` or the local socket.
    #[default]
    Environment,
    #[serde(rename_all = "camelCase")]
    Http {
        endpoint: String,
        #[serde(default)]
        api_version: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Tls {
        endpoint: String,
        #[serde(default)]
        api_version: Option<String>,
        tls: TlsConfig,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub ca_cert: PathBuf,
    pub client_cert: PathBuf,
    pub client_key: PathBuf,
}

impl EngineConnection {
    pub fn tls_config(&self) -> Option<&TlsConfig> {
        match self {
            EngineConnection::Tls { tls, .. } => Some(tls),
            _ => None,
        }
    }

    pub fn api_version(&self) -> Option<&str> {
        match self {
            EngineConnection::Environment => None,
            EngineConnection::Http { api_version, .. }
            | EngineConnection::Tls { api_version, .. } => api_version.as_deref(),
        }
    }

    fn validate(&self) -> Result<(), ExecError> {
        match self {
            EngineConnection::Environment => Ok(()),
            EngineConnection::Http { endpoint, .. } | EngineConnection::Tls { endpoint, .. } => {
                if endpoint.trim().is_empty() {
                    return Err(ExecError::configuration("engine endpoint cannot be empty"));
                }
                if let Some(version) = self.api_version() {
                    parse_api_version(version)?;
                }
                Ok(())
            }
        }
    }
}

/// Parses an engine API version such as `1.41`.
pub fn parse_api_version(version: &str) -> Result<(usize, usize), ExecError> {
    let invalid = || ExecError::configuration(format!("invalid engine API version '{}'", version));
    let (major, minor) = version.trim().split_once('.').ok_or_else(invalid)?;
    let major = major.parse().map_err(|_| invalid())?;
    let minor = minor.parse().map_err(|_| invalid())?;
    Ok((major, minor))
}

/// Container-level settings of a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSettings {
    pub image: String,
    /// Literal command. When absent the command is derived from the request.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub force_pull: bool,
    #[serde(default = "default_true")]
    pub auto_remove: bool,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Extra binds in `host:container[:mode]` form.
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    #[serde(default)]
    pub dns_search: Vec<String>,
    #[serde(default = "default_cpus")]
    pub cpus: f64,
    #[serde(default)]
    pub mem_limit: Option<ByteSize>,
    #[serde(default)]
    pub shm_size: Option<ByteSize>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: String,
    /// Parent directory for auto-provisioned host temp dirs.
    #[serde(default)]
    pub host_tmp_dir: Option<PathBuf>,
    /// Caller-owned host dir; mounted as-is and never cleaned up.
    #[serde(default)]
    pub persistent_host_dir: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_cpus() -> f64 {
    1.0
}

fn default_tmp_dir() -> String {
    DEFAULT_CONTAINER_TMP_DIR.to_string()
}

impl ContainerSettings {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            command: None,
            force_pull: false,
            auto_remove: true,
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            network_mode: None,
            dns: Vec::new(),
            dns_search: Vec::new(),
            cpus: default_cpus(),
            mem_limit: None,
            shm_size: None,
            user: None,
            working_dir: None,
            tmp_dir: default_tmp_dir(),
            host_tmp_dir: None,
            persistent_host_dir: None,
        }
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.image.trim().is_empty() {
            return Err(ExecError::configuration("container image cannot be empty"));
        }

        if !self.cpus.is_finite() || self.cpus <= 0.0 {
            return Err(ExecError::configuration(format!(
                "cpus must be a positive number, got {}",
                self.cpus
            )));
        }

        if !self.tmp_dir.starts_with('/') {
            return Err(ExecError::configuration(format!(
                "container temp dir '{}' must be absolute",
                self.tmp_dir
            )));
        }

        if let Some(dir) = &self.persistent_host_dir {
            if !dir.is_absolute() {
                return Err(ExecError::configuration(format!(
                    "persistent host dir '{}' must be an absolute path",
                    dir.display()
                )));
            }
        }

        for volume in &self.volumes {
            validate_bind(volume)?;
        }

        if let Some(size) = &self.mem_limit {
            size.to_bytes()?;
        }
        if let Some(size) = &self.shm_size {
            size.to_bytes()?;
        }

        if let Some(command) = &self.command {
            LiteralCommand::parse(command)?;
        }

        Ok(())
    }

    /// Engine cpu shares for the configured cpu count (1 cpu = 1024 shares).
    pub fn cpu_shares(&self) -> i64 {
        (self.cpus * 1024.0).round() as i64
    }

    pub fn temp_dir_strategy(&self) -> Arc<dyn TempDirStrategy> {
        match &self.persistent_host_dir {
            Some(dir) => Arc::new(PersistentHostDir::new(dir.clone())),
            None => Arc::new(EphemeralTempDir::new(
                self.host_tmp_dir.clone().unwrap_or_else(std::env::temp_dir),
            )),
        }
    }

    pub fn command_strategy(&self) -> Result<Arc<dyn CommandStrategy>, ExecError> {
        match &self.command {
            Some(command) => Ok(Arc::new(LiteralCommand::parse(command)?)),
            None => Ok(Arc::new(RequestCommand)),
        }
    }
}

fn validate_bind(bind: &str) -> Result<(), ExecError> {
    let parts: Vec<&str> = bind.split(':').collect();
    let valid = match parts.as_slice() {
        [host, container] => !host.is_empty() && container.starts_with('/'),
        [host, container, mode] => {
            !host.is_empty() && container.starts_with('/') && !mode.is_empty()
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ExecError::configuration(format!(
            "volume '{}' must look like host:container[:mode] with an absolute container path",
            bind
        )))
    }
}

/// A byte count, either numeric or with a `b`/`k`/`m`/`g` suffix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteSize {
    Bytes(u64),
    Text(String),
}

impl ByteSize {
    pub fn to_bytes(&self) -> Result<i64, ExecError> {
        match self {
            ByteSize::Bytes(bytes) => i64::try_from(*bytes)
                .map_err(|_| ExecError::configuration(format!("size {} is too large", bytes))),
            ByteSize::Text(text) => parse_byte_size(text),
        }
    }
}

pub fn parse_byte_size(text: &str) -> Result<i64, ExecError> {
    let invalid = || {
        ExecError::configuration(format!(
            "invalid size '{}'; expected a number with an optional b, k, m or g suffix",
            text
        ))
    };

    let trimmed = text.trim().to_ascii_lowercase();
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('b') => (&trimmed[..trimmed.len() - 1], 1i64),
        Some('k') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('m') => (&trimmed[..trimmed.len() - 1], 1024 * 1024),
        Some('g') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * 1024),
        Some(_) => (trimmed.as_str(), 1),
        None => return Err(invalid()),
    };

    let value: i64 = digits.trim().parse().map_err(|_| invalid())?;
    if value < 0 {
        return Err(invalid());
    }
    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Process-wide defaults captured once and passed around explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DefaultEnvironment {
    vars: BTreeMap<String, String>,
}

impl DefaultEnvironment {
    pub fn from_process() -> Self {
        Self::from_vars(
            DEFAULT_ENV_KEYS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (key.to_string(), value))),
        )
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    /// Fills in the environment of settings that did not declare one.
    pub fn apply_to(&self, settings: &mut ContainerSettings) {
        if settings.environment.is_empty() {
            settings.environment = self.vars.clone();
        }
    }
}
