//! Suppresses repeated submissions of the same action.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chatmirror_cdp::CdpError;
use chatmirror_config::DedupConfig;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::actions::{Action, Delivery, SubmitOutcome, derive_action_id};

/// Window table of forwarded action identifiers.
pub struct Deduplicator {
    window: Duration,
    bucket_secs: u64,
    release_on_failure: bool,
    seen: Mutex<HashMap<String, Instant>>,
}

impl Deduplicator {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            window: config.window(),
            bucket_secs: config.derive_bucket_secs,
            release_on_failure: config.release_on_failure,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_window(window: Duration) -> Self {
        Self::new(&DedupConfig::default()).window(window)
    }

    fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn release_on_failure(mut self, enabled: bool) -> Self {
        self.release_on_failure = enabled;
        self
    }

    /// Identifier the action is deduplicated under.
    pub fn identify(&self, port: u16, action: &Action) -> String {
        match &action.msg_id {
            Some(id) => id.clone(),
            None => {
                let arrival = chrono::Utc::now().timestamp().max(0) as u64;
                derive_action_id(port, &action.message, arrival, self.bucket_secs)
            }
        }
    }

    /// Record `id` unless it was recorded within the window. Returns whether
    /// the caller may forward.
    pub fn claim(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        seen.retain(|_, at| now.duration_since(*at) < self.window);
        if seen.contains_key(id) {
            return false;
        }
        seen.insert(id.to_string(), now);
        true
    }

    /// Forget `id` so the next submission goes through.
    pub fn release(&self, id: &str) {
        self.seen.lock().remove(id);
    }

    /// Drop expired identifiers.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        let before = seen.len();
        seen.retain(|_, at| now.duration_since(*at) < self.window);
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forward `action` unless its identifier is inside the window.
    ///
    /// The identifier is recorded before `forward` runs, so concurrent
    /// submissions of the same action forward exactly once.
    pub async fn submit<T, F, Fut>(
        &self,
        port: u16,
        action: &Action,
        forward: F,
    ) -> Result<SubmitOutcome<T>, CdpError>
    where
        T: Delivery,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CdpError>>,
    {
        let id = self.identify(port, action);
        if !self.claim(&id) {
            debug!("Ignoring duplicate action {} for port {}", id, port);
            return Ok(SubmitOutcome::Ignored);
        }

        let result = forward().await;
        if self.should_release(&result) {
            trace!("Releasing action {} after failed forward", id);
            self.release(&id);
        }
        result.map(SubmitOutcome::Forwarded)
    }

    /// A failure before the page was reached always frees the identifier.
    /// A timed-out call may still have landed, so it keeps the claim.
    fn should_release<T: Delivery>(&self, result: &Result<T, CdpError>) -> bool {
        match result {
            Ok(outcome) => !outcome.delivered() && self.release_on_failure,
            Err(e) if e.is_undelivered() => true,
            Err(CdpError::CallTimeout { .. }) => false,
            Err(_) => self.release_on_failure,
        }
    }

    /// Periodically prune expired identifiers until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let dedup = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let pruned = dedup.prune();
                        if pruned > 0 {
                            trace!("Pruned {} expired action ids", pruned);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "dedup_tests.rs"]
mod tests;
