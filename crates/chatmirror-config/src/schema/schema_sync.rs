//! Synchronization configuration (polling, fan-out, action dedup).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot polling and viewer fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Interval between snapshot polls of a watched port.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Queue depth per viewer before it is dropped as too slow.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,

    /// Upper bound on a single socket write to a viewer.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Optional file replacing the built-in capture expression.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture_script: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            subscriber_buffer: default_subscriber_buffer(),
            send_timeout_ms: default_send_timeout_ms(),
            capture_script: None,
        }
    }
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    1500
}

fn default_subscriber_buffer() -> usize {
    16
}

fn default_send_timeout_ms() -> u64 {
    2000
}

/// Duplicate suppression for submitted actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a forwarded identifier suppresses repeats.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Arrival bucket used when deriving an identifier from content.
    #[serde(default = "default_derive_bucket_secs")]
    pub derive_bucket_secs: u64,

    /// Interval of the background sweep of expired identifiers.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Forget an identifier whose forward failed so a retry can pass.
    /// Timed-out calls keep their identifier regardless.
    #[serde(default = "default_release_on_failure")]
    pub release_on_failure: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            derive_bucket_secs: default_derive_bucket_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            release_on_failure: default_release_on_failure(),
        }
    }
}

impl DedupConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_window_secs() -> u64 {
    30
}

fn default_derive_bucket_secs() -> u64 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_release_on_failure() -> bool {
    true
}
