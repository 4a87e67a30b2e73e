//! Chat sync configuration.

use crate::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the chat sync engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Base URL of the local chat service (e.g., "http://127.0.0.1:5000").
    pub api_base_url: String,

    /// Device id of this node, used to tell our own messages apart.
    pub local_device_id: String,

    /// Roster/message poll interval (milliseconds).
    pub poll_interval_ms: u64,

    /// Per-request HTTP timeout (seconds).
    pub request_timeout_secs: u64,

    /// Delay before re-fetching messages after an upload completes (milliseconds).
    pub upload_refresh_delay_ms: u64,

    /// Location of the persisted display-name file. `None` uses the platform data dir.
    #[serde(default)]
    pub names_path: Option<PathBuf>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:5000".to_string(),
            local_device_id: "00:00:00:00:00:00".to_string(),
            poll_interval_ms: 3000,
            request_timeout_secs: 30,
            upload_refresh_delay_ms: 500,
            names_path: None,
        }
    }
}

impl ChatConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.upload_refresh_delay_ms)
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> ChatResult<()> {
        if self.api_base_url.trim().is_empty() {
            return Err(ChatError::Config("missing api_base_url".to_string()));
        }
        if self.poll_interval_ms == 0 {
            return Err(ChatError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
