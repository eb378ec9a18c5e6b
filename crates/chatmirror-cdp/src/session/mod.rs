//! CDP session bound to a single page target.

mod contexts;
mod core;
mod js;

use std::time::Duration;

use chatmirror_config::DevtoolsConfig;

pub use self::contexts::{ContextWorld, ExecutionContext};
pub use self::core::Session;

/// Timeouts applied by a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on the WebSocket handshake.
    pub handshake_timeout: Duration,
    /// Default bound on a single call.
    pub call_timeout: Duration,
    /// Grace period after enabling `Runtime` for contexts to be announced.
    pub context_settle: Duration,
}

impl From<&DevtoolsConfig> for SessionOptions {
    fn from(config: &DevtoolsConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout(),
            call_timeout: config.call_timeout(),
            context_settle: config.context_settle(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&DevtoolsConfig::default())
    }
}
