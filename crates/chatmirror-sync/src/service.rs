//! Entry point tying the pool, hub, poller and deduplicator together.

use std::sync::Arc;

use chatmirror_cdp::{CdpError, ConnectionPool, Discovery, Session, SessionOptions, SlotInfo};
use chatmirror_config::{Config, DevtoolsConfig};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::actions::{Action, SubmitOutcome};
use crate::automation::{AppState, Automation, InjectOutcome};
use crate::dedup::Deduplicator;
use crate::error::SyncError;
use crate::hub::{Hub, Subscription};
use crate::poller::Poller;
use crate::snapshot::Snapshot;

/// The relay's shared state.
pub struct SyncService {
    devtools: DevtoolsConfig,
    pool: Arc<ConnectionPool>,
    hub: Arc<Hub>,
    poller: Poller,
    dedup: Arc<Deduplicator>,
    automation: Arc<Automation>,
    cancel: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    /// Build every component from configuration and start the dedup sweep.
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &Config) -> Result<Self, SyncError> {
        let discovery = Discovery::from_config(&config.devtools)
            .map_err(|e| SyncError::Filter(e.to_string()))?;
        let pool = Arc::new(ConnectionPool::new(
            discovery,
            SessionOptions::from(&config.devtools),
        ));
        let hub = Arc::new(Hub::new(config.sync.subscriber_buffer));
        let automation = Arc::new(Automation::from_config(&config.sync)?);
        let poller = Poller::new(
            pool.clone(),
            hub.clone(),
            automation.clone(),
            config.sync.poll_interval(),
        );
        let dedup = Arc::new(Deduplicator::new(&config.dedup));
        let cancel = CancellationToken::new();
        let sweeper = dedup.spawn_sweeper(config.dedup.sweep_interval(), cancel.child_token());

        Ok(Self {
            devtools: config.devtools.clone(),
            pool,
            hub,
            poller,
            dedup,
            automation,
            cancel,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    pub fn default_port(&self) -> u16 {
        self.devtools.default_port
    }

    pub fn ports(&self) -> &[u16] {
        &self.devtools.ports
    }

    /// Register a viewer for `port` and make sure the port is polled.
    pub fn subscribe(&self, port: u16) -> Subscription {
        let subscription = self.hub.subscribe(port);
        self.poller.ensure(port);
        subscription
    }

    pub fn switch_port(&self, id: &str, port: u16) -> bool {
        if !self.hub.switch_port(id, port) {
            return false;
        }
        self.poller.ensure(port);
        true
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Submit a chat message unless it duplicates a recent one.
    pub async fn send_action(
        &self,
        port: u16,
        action: Action,
    ) -> Result<SubmitOutcome<InjectOutcome>, CdpError> {
        self.dedup
            .submit(port, &action, || async {
                let session = self.pool.get_or_open(port).await?;
                let result = self
                    .automation
                    .inject(&session, &action.message, action.force)
                    .await;
                self.evict_if_closed(port, &session, &result);
                result
            })
            .await
    }

    /// Capture the port's chat view outside the poll loop.
    pub async fn capture_once(&self, port: u16) -> Result<Option<Snapshot>, CdpError> {
        let session = self.pool.get_or_open(port).await?;
        let result = self.automation.capture(&session, None).await;
        self.evict_if_closed(port, &session, &result);
        Ok(result?.map(|(capture, _)| Snapshot::from_capture(port, capture)))
    }

    pub async fn app_state(&self, port: u16) -> Result<AppState, CdpError> {
        let session = self.pool.get_or_open(port).await?;
        let result = self.automation.app_state(&session).await;
        self.evict_if_closed(port, &session, &result);
        result
    }

    pub async fn set_mode(&self, port: u16, mode: &str) -> Result<Value, CdpError> {
        let session = self.pool.get_or_open(port).await?;
        let result = self.automation.set_mode(&session, mode).await;
        self.evict_if_closed(port, &session, &result);
        result
    }

    pub async fn set_model(&self, port: u16, model: &str) -> Result<Value, CdpError> {
        let session = self.pool.get_or_open(port).await?;
        let result = self.automation.set_model(&session, model).await;
        self.evict_if_closed(port, &session, &result);
        result
    }

    /// Probe every configured port.
    pub async fn slots(&self) -> Vec<SlotInfo> {
        self.pool.discovery().scan_slots(&self.devtools.ports).await
    }

    fn evict_if_closed<T>(&self, port: u16, session: &Arc<Session>, result: &Result<T, CdpError>) {
        if matches!(result, Err(CdpError::SessionClosed)) {
            debug!("Session on port {} closed during a request", port);
            self.pool.evict(port, session);
        }
    }

    /// Stop polling and the sweep, then close every session.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.await;
        }
        self.poller.shutdown().await;
        self.pool.close_all().await;
        info!("Sync service stopped");
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
