//! Fan-out of snapshots to viewers.
//!
//! Each subscriber has a bounded queue. Publishing never waits: a subscriber
//! whose queue is full or closed is dropped, which closes its receiver and
//! lets the socket writer shut the connection.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::snapshot::Snapshot;

/// Identifier of a subscriber.
pub type SubscriberId = String;

struct Subscriber {
    port: u16,
    tx: mpsc::Sender<Arc<Snapshot>>,
    last_fingerprint: Option<String>,
}

impl Subscriber {
    /// Queue `snapshot` unless this subscriber already has it. Returns
    /// `false` when the subscriber must be dropped.
    fn offer(&mut self, id: &str, snapshot: &Arc<Snapshot>) -> bool {
        if self.last_fingerprint.as_deref() == Some(snapshot.fingerprint.as_str()) {
            return true;
        }
        match self.tx.try_send(snapshot.clone()) {
            Ok(()) => {
                self.last_fingerprint = Some(snapshot.fingerprint.clone());
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber {} is not keeping up, dropping it", id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Subscriber {} went away", id);
                false
            }
        }
    }
}

/// A new subscriber's handle.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<Arc<Snapshot>>,
}

/// Routes snapshots to the subscribers watching each port.
pub struct Hub {
    subscribers: DashMap<SubscriberId, Subscriber>,
    latest: DashMap<u16, Arc<Snapshot>>,
    buffer: usize,
}

impl Hub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            latest: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a subscriber for `port`. The port's latest snapshot, if any,
    /// is queued right away.
    pub fn subscribe(&self, port: u16) -> Subscription {
        let id = Uuid::new_v4().to_string();
        let (tx, receiver) = mpsc::channel(self.buffer);
        self.subscribers.insert(
            id.clone(),
            Subscriber {
                port,
                tx,
                last_fingerprint: None,
            },
        );
        // Registered before reading `latest`: a concurrent publish either
        // reaches this subscriber or has already replaced the cached snapshot.
        if let Some(mut subscriber) = self.subscribers.get_mut(&id) {
            if let Some(snapshot) = self.latest(port) {
                subscriber.offer(&id, &snapshot);
            }
        }
        info!("Subscriber {} watching port {}", id, port);
        Subscription { id, receiver }
    }

    /// Point a subscriber at another port. Returns `false` for an unknown
    /// subscriber.
    pub fn switch_port(&self, id: &str, port: u16) -> bool {
        let keep = {
            let Some(mut subscriber) = self.subscribers.get_mut(id) else {
                return false;
            };
            if subscriber.port != port {
                subscriber.port = port;
                subscriber.last_fingerprint = None;
            }
            match self.latest(port) {
                Some(snapshot) => subscriber.offer(id, &snapshot),
                None => true,
            }
        };
        if !keep {
            self.subscribers.remove(id);
            return false;
        }
        debug!("Subscriber {} switched to port {}", id, port);
        true
    }

    /// Drop the cached snapshot of `port` so nobody is handed content the
    /// port can no longer vouch for.
    pub fn forget(&self, port: u16) -> bool {
        let forgotten = self.latest.remove(&port).is_some();
        if forgotten {
            debug!("Forgot cached snapshot for port {}", port);
        }
        forgotten
    }

    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.subscribers.remove(id).is_some();
        if removed {
            info!("Subscriber {} left", id);
        }
        removed
    }

    /// Cache `snapshot` as the port's latest and queue it for every
    /// subscriber of the port. Returns how many subscribers received it.
    pub fn publish(&self, port: u16, snapshot: Arc<Snapshot>) -> usize {
        self.latest.insert(port, snapshot.clone());

        let mut delivered = 0;
        let mut dropped = Vec::new();
        for mut entry in self.subscribers.iter_mut() {
            if entry.port != port {
                continue;
            }
            let id = entry.key().clone();
            if entry.value_mut().offer(&id, &snapshot) {
                delivered += 1;
            } else {
                dropped.push(id);
            }
        }
        for id in dropped {
            self.subscribers.remove(&id);
        }
        debug!(
            "Published snapshot {} on port {} to {} subscribers",
            snapshot.fingerprint, port, delivered
        );
        delivered
    }

    /// Port a subscriber is watching.
    pub fn port_of(&self, id: &str) -> Option<u16> {
        self.subscribers.get(id).map(|s| s.port)
    }

    pub fn latest(&self, port: u16) -> Option<Arc<Snapshot>> {
        self.latest.get(&port).map(|s| s.clone())
    }

    pub fn latest_fingerprint(&self, port: u16) -> Option<String> {
        self.latest.get(&port).map(|s| s.fingerprint.clone())
    }

    pub fn subscriber_count(&self, port: u16) -> usize {
        self.subscribers.iter().filter(|s| s.port == port).count()
    }

    pub fn total_subscribers(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
