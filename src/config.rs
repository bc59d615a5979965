//! Configuration module for the acquisition engine
//!
//! Handles configuration loading from TOML files and environment
//! variables, and provides structured configuration types.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// IPC capture-server configuration
    pub ipc: IpcConfig,

    /// Runmode selection and thread-graph tuning
    #[serde(default)]
    pub runmode: RunmodeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Comma-separated list of capture-server identifiers.
    /// Required; absence is fatal at runmode startup.
    pub server: Option<String>,

    /// Packet buffers pre-allocated per acquisition cycle
    #[serde(default, alias = "allocation-batch")]
    pub allocation_batch: Option<usize>,

    /// Transport backend. Only the in-process loopback generator ships
    /// with the engine; real IPC transports are plugged in by the host.
    #[serde(default = "default_transport")]
    pub transport: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunmodeConfig {
    /// Requested topology (`single`, `autofp`, `workers`).
    /// Unset falls back to the engine default.
    pub mode: Option<String>,

    /// Detection threads for the autofp topology. Unset derives the
    /// count from available parallelism minus reservations.
    pub detect_threads: Option<usize>,

    /// Capacity of the bounded hand-off queues between stages
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

// Default value functions
fn default_transport() -> String {
    "loopback".to_string()
}
fn default_queue_depth() -> usize {
    64
}

impl Default for RunmodeConfig {
    fn default() -> Self {
        Self {
            mode: None,
            detect_threads: None,
            queue_depth: default_queue_depth(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env(path: &str) -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_file(path)
    }

    /// Reject values no runmode could start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(batch) = self.ipc.allocation_batch {
            if batch == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "ipc.allocation-batch",
                    reason: "must be a positive integer".to_string(),
                });
            }
        }
        if self.runmode.queue_depth == 0 {
            return Err(ConfigError::InvalidValue {
                key: "runmode.queue_depth",
                reason: "must be a positive integer".to_string(),
            });
        }
        if let Some(detect) = self.runmode.detect_threads {
            if detect == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "runmode.detect_threads",
                    reason: "must be a positive integer".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ipc: IpcConfig {
                server: None,
                allocation_batch: None,
                transport: default_transport(),
            },
            runmode: RunmodeConfig {
                mode: None,
                detect_threads: None,
                queue_depth: default_queue_depth(),
            },
        }
    }
}
