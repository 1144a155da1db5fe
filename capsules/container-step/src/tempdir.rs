use crate::error::ExecError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

const TEMP_DIR_PREFIX: &str = "steptmp";

/// Provides the host directory bind-mounted into the step container.
pub trait TempDirStrategy: Send + Sync {
    fn provision(&self) -> Result<HostDir, ExecError>;
}

/// A host directory owned either by the invocation or by the caller.
#[derive(Debug)]
pub enum HostDir {
    /// Removed when released or dropped.
    Ephemeral(TempDir),
    /// Left in place; the caller owns its lifecycle.
    Persistent(PathBuf),
}

impl HostDir {
    pub fn path(&self) -> &Path {
        match self {
            HostDir::Ephemeral(dir) => dir.path(),
            HostDir::Persistent(path) => path,
        }
    }

    /// Cleans up an ephemeral directory. Failures are logged, never returned,
    /// so they cannot mask the invocation's own outcome.
    pub fn release(self) {
        match self {
            HostDir::Ephemeral(dir) => {
                let path = dir.path().to_path_buf();
                match dir.close() {
                    Ok(()) => debug!(path = %path.display(), "removed host temp dir"),
                    Err(err) => warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to remove host temp dir"
                    ),
                }
            }
            HostDir::Persistent(path) => {
                debug!(path = %path.display(), "leaving caller-owned host dir in place")
            }
        }
    }
}

/// Creates a fresh directory under `parent` for every invocation.
#[derive(Debug, Clone)]
pub struct EphemeralTempDir {
    parent: PathBuf,
}

impl EphemeralTempDir {
    pub fn new(parent: impl Into<PathBuf>) -> Self {
        Self {
            parent: parent.into(),
        }
    }
}

impl TempDirStrategy for EphemeralTempDir {
    fn provision(&self) -> Result<HostDir, ExecError> {
        let dir = tempfile::Builder::new()
            .prefix(TEMP_DIR_PREFIX)
            .tempdir_in(&self.parent)
            .map_err(|source| ExecError::HostDirectory {
                path: self.parent.clone(),
                source,
            })?;
        debug!(path = %dir.path().display(), "provisioned host temp dir");
        Ok(HostDir::Ephemeral(dir))
    }
}

/// Mounts a fixed, caller-supplied directory.
#[derive(Debug, Clone)]
pub struct PersistentHostDir {
    path: PathBuf,
}

impl PersistentHostDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TempDirStrategy for PersistentHostDir {
    fn provision(&self) -> Result<HostDir, ExecError> {
        fs::create_dir_all(&self.path).map_err(|source| ExecError::HostDirectory {
            path: self.path.clone(),
            source,
        })?;
        Ok(HostDir::Persistent(self.path.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ephemeral_dir_is_removed_on_release() {
        let parent = tempfile::tempdir().unwrap();
        let host_dir = EphemeralTempDir::new(parent.path()).provision().unwrap();
        let path = host_dir.path().to_path_buf();

        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(TEMP_DIR_PREFIX));

        host_dir.release();
        assert!(!path.exists());
    }

    #[test]
    fn ephemeral_dir_is_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let host_dir = EphemeralTempDir::new(parent.path()).provision().unwrap();
            host_dir.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn persistent_dir_survives_release() {
        let parent = tempfile::tempdir().unwrap();
        let fixed = parent.path().join("keep");

        let host_dir = PersistentHostDir::new(&fixed).provision().unwrap();
        assert_eq!(host_dir.path(), fixed.as_path());
        host_dir.release();

        assert!(fixed.is_dir());
    }

    #[test]
    fn missing_parent_is_reported() {
        let err = EphemeralTempDir::new("/definitely/not/here")
            .provision()
            .unwrap_err();
        assert_eq!(err.code(), "STEP_EXEC_HOST_DIRECTORY");
    }
}
