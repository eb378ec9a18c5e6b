//! Application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatmirror_config::SyncConfig;
use chatmirror_sync::SyncService;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// A port as sent by clients: a number or a numeric string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortArg {
    Number(i64),
    Text(String),
}

impl PortArg {
    /// The port, or `None` when it is not a valid non-zero port number.
    pub fn port(&self) -> Option<u16> {
        match self {
            PortArg::Number(n) => u16::try_from(*n).ok(),
            PortArg::Text(s) => s.trim().parse().ok(),
        }
        .filter(|port| *port != 0)
    }
}

/// Application state shared across handlers.
pub struct ApiState {
    pub service: Arc<SyncService>,
    send_timeout: Duration,
    start_time: Instant,
    request_count: AtomicU64,
}

impl ApiState {
    pub fn new(service: Arc<SyncService>, sync: &SyncConfig) -> Self {
        Self {
            service,
            send_timeout: sync.send_timeout(),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Bound on a single write to a viewer socket.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    pub fn increment_requests(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Pick the first port given, falling back to the configured default.
    /// A port that is present but malformed is rejected.
    pub fn resolve_port<'a>(
        &self,
        candidates: impl IntoIterator<Item = Option<&'a PortArg>>,
    ) -> Result<u16, ApiError> {
        match candidates.into_iter().flatten().next() {
            Some(arg) => arg
                .port()
                .ok_or_else(|| ApiError::bad_request(format!("invalid port: {:?}", arg))),
            None => Ok(self.service.default_port()),
        }
    }
}
