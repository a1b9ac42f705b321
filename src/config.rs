//! Client configuration parsing and validation.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::supervisor::{SpawnConfig, WorkerMode};
use crate::{ClientError, Result};

/// Default per-request deadline, in seconds.
const fn default_request_timeout_seconds() -> u64 {
    30
}

/// Default bound on the worker's startup ready signal, in seconds.
const fn default_startup_timeout_seconds() -> u64 {
    10
}

/// Client configuration, typically loaded from a TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClientConfig {
    /// Worker executable path.
    pub worker_path: PathBuf,
    /// Extra arguments inserted before the fixed launch contract.
    #[serde(default)]
    pub worker_args: Vec<String>,
    /// Workspace root handed to the worker via `--workspace`.
    pub workspace_root: PathBuf,
    /// Per-request deadline in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Startup ready-signal bound in seconds.
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
}

impl ClientConfig {
    /// Build a configuration with default timeouts.
    #[must_use]
    pub fn new(worker_path: PathBuf, workspace_root: PathBuf) -> Self {
        Self {
            worker_path,
            worker_args: Vec::new(),
            workspace_root,
            request_timeout_seconds: default_request_timeout_seconds(),
            startup_timeout_seconds: default_startup_timeout_seconds(),
        }
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] on parse failure or invalid values.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] when a path is empty or a timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.worker_path.as_os_str().is_empty() {
            return Err(ClientError::Config("worker_path must not be empty".into()));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(ClientError::Config(
                "workspace_root must not be empty".into(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ClientError::Config(
                "request_timeout_seconds must be positive".into(),
            ));
        }
        if self.startup_timeout_seconds == 0 {
            return Err(ClientError::Config(
                "startup_timeout_seconds must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Per-request deadline as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Startup ready-signal bound as a [`Duration`].
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }

    /// Derive the supervisor spawn configuration.
    #[must_use]
    pub fn spawn_config(&self) -> SpawnConfig {
        SpawnConfig {
            worker_path: self.worker_path.clone(),
            worker_args: self.worker_args.clone(),
            workspace_root: self.workspace_root.clone(),
            mode: WorkerMode::Server,
            startup_timeout: self.startup_timeout(),
        }
    }
}
