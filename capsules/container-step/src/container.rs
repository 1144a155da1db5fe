use crate::config::{ContainerSettings, TMP_DIR_ENV};
use crate::error::ExecError;
use std::collections::BTreeMap;
use std::path::Path;
use uuid::Uuid;

/// Engine-facing description of the step container. Fixed once created.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub environment: BTreeMap<String, String>,
    /// `host:container[:mode]` binds, caller volumes first, temp dir last.
    pub binds: Vec<String>,
    pub resources: ResourceLimits,
    pub network_mode: Option<String>,
    pub dns: Vec<String>,
    pub dns_search: Vec<String>,
    pub working_dir: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub cpu_shares: i64,
    pub memory: Option<i64>,
    pub shm_size: Option<i64>,
}

impl ContainerSpec {
    pub fn assemble(
        settings: &ContainerSettings,
        command: Vec<String>,
        host_dir: &Path,
    ) -> Result<Self, ExecError> {
        let mut environment = settings.environment.clone();
        environment.insert(TMP_DIR_ENV.to_string(), settings.tmp_dir.clone());

        let mut binds = settings.volumes.clone();
        binds.push(format!("{}:{}", host_dir.display(), settings.tmp_dir));

        let resources = ResourceLimits {
            cpu_shares: settings.cpu_shares(),
            memory: settings
                .mem_limit
                .as_ref()
                .map(|size| size.to_bytes())
                .transpose()?,
            shm_size: settings
                .shm_size
                .as_ref()
                .map(|size| size.to_bytes())
                .transpose()?,
        };

        Ok(Self {
            name: format!("step-{}", Uuid::new_v4().simple()),
            image: settings.image.clone(),
            command,
            environment,
            binds,
            resources,
            network_mode: settings.network_mode.clone(),
            dns: settings.dns.clone(),
            dns_search: settings.dns_search.clone(),
            working_dir: settings.working_dir.clone(),
            user: settings.user.clone(),
        })
    }

    /// Environment in the engine's `KEY=value` form.
    pub fn env_list(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect()
    }
}
