//! Per-port snapshot polling.
//!
//! A worker runs for every port with at least one subscriber. Each tick it
//! captures the chat view, fingerprints it and publishes to the hub when the
//! fingerprint differs from the port's last published one. A lost session
//! clears the port's cached snapshot and puts the worker to sleep until a
//! subscriber asks for the port again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chatmirror_cdp::{CdpError, ConnectionPool, Session};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, warn};

use crate::automation::Automation;
use crate::hub::Hub;
use crate::snapshot::Snapshot;

struct WorkerHandle {
    id: u64,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Spawns and tracks poll workers.
pub struct Poller {
    pool: Arc<ConnectionPool>,
    hub: Arc<Hub>,
    automation: Arc<Automation>,
    interval: Duration,
    workers: Arc<DashMap<u16, WorkerHandle>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        pool: Arc<ConnectionPool>,
        hub: Arc<Hub>,
        automation: Arc<Automation>,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            hub,
            automation,
            interval,
            workers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Make sure `port` has a running worker and wake it if it was dormant.
    /// Call after the subscriber has been registered with the hub.
    pub fn ensure(&self, port: u16) {
        if self.cancel.is_cancelled() {
            return;
        }
        match self.workers.entry(port) {
            Entry::Occupied(entry) => entry.get().wake.notify_one(),
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let wake = Arc::new(Notify::new());
                let worker = Worker {
                    port,
                    id,
                    pool: self.pool.clone(),
                    hub: self.hub.clone(),
                    automation: self.automation.clone(),
                    workers: self.workers.clone(),
                    wake: wake.clone(),
                    interval: self.interval,
                    cancel: self.cancel.child_token(),
                };
                let span = tracing::info_span!("poll_worker", port = port, worker = id);
                let task = tokio::spawn(worker.run().instrument(span));
                entry.insert(WorkerHandle { id, wake, task });
                info!("Started poll worker {} for port {}", id, port);
            }
        }
    }

    /// Ports with a live worker.
    pub fn active_ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self.workers.iter().map(|w| *w.key()).collect();
        ports.sort_unstable();
        ports
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stop every worker and wait for them to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let ports: Vec<u16> = self.workers.iter().map(|w| *w.key()).collect();
        for port in ports {
            if let Some((_, handle)) = self.workers.remove(&port) {
                let _ = handle.task.await;
            }
        }
    }
}

struct Worker {
    port: u16,
    id: u64,
    pool: Arc<ConnectionPool>,
    hub: Arc<Hub>,
    automation: Arc<Automation>,
    workers: Arc<DashMap<u16, WorkerHandle>>,
    wake: Arc<Notify>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut dormant = false;
        let mut last_context: Option<i64> = None;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {
                    if dormant {
                        debug!("Woken up");
                    }
                    dormant = false;
                }
            }

            if self.retire_if_unwatched() {
                break;
            }

            let session = if dormant {
                match self.pool.peek(self.port) {
                    Some(session) => {
                        dormant = false;
                        session
                    }
                    None => continue,
                }
            } else {
                match self.pool.get_or_open(self.port).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!("Cannot reach port {}: {}; waiting for a subscriber", self.port, e);
                        self.hub.forget(self.port);
                        dormant = true;
                        continue;
                    }
                }
            };

            match self.tick(&session, last_context).await {
                Ok(context) => last_context = context.or(last_context),
                Err(CdpError::SessionClosed) => {
                    warn!("Session on port {} closed; waiting for a subscriber", self.port);
                    self.pool.evict(self.port, &session);
                    self.hub.forget(self.port);
                    dormant = true;
                    last_context = None;
                }
                Err(e) => debug!("Skipping tick on port {}: {}", self.port, e),
            }
        }

        debug!("Poll worker {} for port {} stopped", self.id, self.port);
    }

    /// Remove this worker when its port has no subscribers. The check runs
    /// under the map entry's lock, so it cannot race `Poller::ensure`.
    fn retire_if_unwatched(&self) -> bool {
        let removed = self
            .workers
            .remove_if(&self.port, |_, handle| {
                handle.id == self.id && self.hub.subscriber_count(self.port) == 0
            })
            .is_some();
        if removed {
            info!("No subscribers left on port {}, stopping worker", self.port);
            // Unpolled, the cached view would go stale.
            self.hub.forget(self.port);
        }
        removed
    }

    /// Capture once and publish on change. Returns the context that
    /// produced the capture.
    async fn tick(&self, session: &Session, hint: Option<i64>) -> Result<Option<i64>, CdpError> {
        let Some((capture, context)) = self.automation.capture(session, hint).await? else {
            return Ok(None);
        };
        let snapshot = Snapshot::from_capture(self.port, capture);
        if self.hub.latest_fingerprint(self.port).as_deref() != Some(snapshot.fingerprint.as_str()) {
            self.hub.publish(self.port, Arc::new(snapshot));
        }
        Ok(context)
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
