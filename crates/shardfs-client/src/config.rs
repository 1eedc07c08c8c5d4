//! Session configuration.

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connection settings pushed to the native client before start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageConfig {
    /// Comma-separated master (metadata) node addresses.
    pub masters: String,
    /// Volume to attach to.
    pub volume_name: String,
    /// Directory for the native client's own log files.
    pub log_dir: String,
    /// Native client log level (`debug`, `info`, `warn`, `error`).
    pub log_level: String,
}

// Keys understood by the native client's set_client call.
pub const CONFIG_KEY_MASTERS: &str = "masterAddr";
pub const CONFIG_KEY_VOLUME: &str = "volName";
pub const CONFIG_KEY_LOG_DIR: &str = "logDir";
pub const CONFIG_KEY_LOG_LEVEL: &str = "logLevel";

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            masters: String::new(),
            volume_name: String::new(),
            log_dir: "/tmp/shardfs/log".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.masters.trim().is_empty() {
            return Err(StorageError::NullArgument {
                msg: "masters is empty".to_string(),
            });
        }
        if self.volume_name.trim().is_empty() {
            return Err(StorageError::NullArgument {
                msg: "volume_name is empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| StorageError::InvalidArgument {
            msg: format!("cannot read config {}: {e}", path.display()),
        })?;
        let config: Self =
            serde_json::from_str(&text).map_err(|e| StorageError::InvalidArgument {
                msg: format!("cannot parse config {}: {e}", path.display()),
            })?;
        config.validate()?;
        Ok(config)
    }
}
