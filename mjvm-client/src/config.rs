// Debugger configuration
//
// Loaded from JSON; every field has a default matching the device firmware.

use crate::protocol::{DebugResult, DebuggerError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5555;

pub const ENV_CONFIG: &str = "MJVM_DEBUG_CONFIG";
pub const ENV_HOST: &str = "MJVM_DEBUG_HOST";
pub const ENV_PORT: &str = "MJVM_DEBUG_PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    pub host: String,
    pub port: u16,
    /// Bound on waiting for any single reply
    pub response_timeout_ms: u64,
    /// Period of the background READ_STATUS poll
    pub status_poll_interval_ms: u64,
    /// Period for re-checking the cached status while waiting for a stop
    pub stop_poll_interval_ms: u64,
    /// Single steps allowed in one step-in before giving up
    pub max_step_instructions: u32,
    /// Root used to derive source paths from class names
    pub source_root: Option<PathBuf>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            response_timeout_ms: 100,
            status_poll_interval_ms: 100,
            stop_poll_interval_ms: 50,
            max_step_instructions: 10_000,
            source_root: None,
        }
    }
}

impl DebuggerConfig {
    pub fn from_json_str(json: &str) -> DebugResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DebuggerError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> DebugResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            DebuggerError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Override the endpoint from `MJVM_DEBUG_HOST` / `MJVM_DEBUG_PORT`
    pub fn apply_env(&mut self) -> DebugResult<()> {
        self.apply_overrides(
            std::env::var(ENV_HOST).ok(),
            std::env::var(ENV_PORT).ok(),
        )
    }

    fn apply_overrides(&mut self, host: Option<String>, port: Option<String>) -> DebugResult<()> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port
                .parse()
                .map_err(|_| DebuggerError::Config(format!("Invalid port: {}", port)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> DebugResult<()> {
        if self.response_timeout_ms == 0 {
            return Err(DebuggerError::Config("response_timeout_ms must be > 0".to_string()));
        }
        if self.status_poll_interval_ms == 0 || self.stop_poll_interval_ms == 0 {
            return Err(DebuggerError::Config("poll intervals must be > 0".to_string()));
        }
        if self.max_step_instructions == 0 {
            return Err(DebuggerError::Config("max_step_instructions must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms)
    }
}
