//! DevTools endpoint configuration (discovery, sessions).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the IDE instances expose their remote-debugging endpoints and how
/// sessions to them behave.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevtoolsConfig {
    /// Host of the debug listeners.
    #[serde(default = "default_devtools_host")]
    pub host: String,

    /// Debug ports that may host an IDE instance.
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,

    /// Port a new viewer watches until it switches.
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// WebSocket handshake timeout.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Default per-call timeout.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Grace period for initial execution contexts after `Runtime.enable`.
    #[serde(default = "default_context_settle_ms")]
    pub context_settle_ms: u64,

    /// Substring identifying the IDE's main window URL.
    #[serde(default = "default_url_pattern")]
    pub url_pattern: String,

    /// Regex of window titles that are never the chat host.
    #[serde(default = "default_title_exclude")]
    pub title_exclude: String,
}

impl Default for DevtoolsConfig {
    fn default() -> Self {
        Self {
            host: default_devtools_host(),
            ports: default_ports(),
            default_port: default_port(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            call_timeout_ms: default_call_timeout_ms(),
            context_settle_ms: default_context_settle_ms(),
            url_pattern: default_url_pattern(),
            title_exclude: default_title_exclude(),
        }
    }
}

impl DevtoolsConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn context_settle(&self) -> Duration {
        Duration::from_millis(self.context_settle_ms)
    }

    /// Base URL of the HTTP listing endpoint for `port`.
    pub fn endpoint(&self, port: u16) -> String {
        format!("http://{}:{}", self.host, port)
    }
}

fn default_devtools_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ports() -> Vec<u16> {
    vec![9000, 9001, 9002, 9003]
}

fn default_port() -> u16 {
    9000
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}

fn default_call_timeout_ms() -> u64 {
    5000
}

fn default_context_settle_ms() -> u64 {
    200
}

fn default_url_pattern() -> String {
    "workbench.html".to_string()
}

fn default_title_exclude() -> String {
    "Launchpad|Walkthrough|Quota Monitor".to_string()
}
