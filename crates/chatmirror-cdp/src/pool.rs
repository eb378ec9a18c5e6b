//! One session per debug port, opened on demand.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::discovery::Discovery;
use crate::error::CdpError;
use crate::session::{Session, SessionOptions};

type OpenAttempt = Shared<BoxFuture<'static, Result<Arc<Session>, CdpError>>>;

enum Slot {
    Ready(Arc<Session>),
    Opening { attempt: u64, future: OpenAttempt },
}

/// Caches sessions by port.
///
/// Concurrent callers for a port without a healthy session share a single
/// open attempt and all observe its outcome.
pub struct ConnectionPool {
    discovery: Arc<Discovery>,
    options: SessionOptions,
    slots: Mutex<HashMap<u16, Slot>>,
    attempts: AtomicU64,
}

impl ConnectionPool {
    pub fn new(discovery: Discovery, options: SessionOptions) -> Self {
        Self {
            discovery: Arc::new(discovery),
            options,
            slots: Mutex::new(HashMap::new()),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Return the cached healthy session for `port` or open one.
    pub async fn get_or_open(&self, port: u16) -> Result<Arc<Session>, CdpError> {
        let (attempt, future) = {
            let mut slots = self.slots.lock();
            match slots.get(&port) {
                Some(Slot::Ready(session)) if session.is_healthy() => {
                    return Ok(session.clone());
                }
                Some(Slot::Opening { attempt, future }) => (*attempt, future.clone()),
                _ => {
                    let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let future = open_port(self.discovery.clone(), self.options.clone(), port)
                        .boxed()
                        .shared();
                    slots.insert(
                        port,
                        Slot::Opening {
                            attempt,
                            future: future.clone(),
                        },
                    );
                    debug!("Opening session for port {} (attempt {})", port, attempt);
                    (attempt, future)
                }
            }
        };

        let result = future.await;
        self.settle(port, attempt, &result);
        result
    }

    /// Record the outcome of an attempt unless a newer one replaced it.
    fn settle(&self, port: u16, attempt: u64, result: &Result<Arc<Session>, CdpError>) {
        let mut slots = self.slots.lock();
        let current = matches!(
            slots.get(&port),
            Some(Slot::Opening { attempt: a, .. }) if *a == attempt
        );
        if !current {
            return;
        }
        match result {
            Ok(session) => {
                slots.insert(port, Slot::Ready(session.clone()));
            }
            Err(_) => {
                slots.remove(&port);
            }
        }
    }

    /// Drop the cached entry for `port` if it still holds `session`.
    pub fn evict(&self, port: u16, session: &Arc<Session>) -> bool {
        let mut slots = self.slots.lock();
        let holds = matches!(
            slots.get(&port),
            Some(Slot::Ready(cached)) if Arc::ptr_eq(cached, session)
        );
        if holds {
            slots.remove(&port);
            info!("Evicted session for port {}", port);
        }
        holds
    }

    /// Cached healthy session, without opening one.
    pub fn peek(&self, port: u16) -> Option<Arc<Session>> {
        match self.slots.lock().get(&port) {
            Some(Slot::Ready(session)) if session.is_healthy() => Some(session.clone()),
            _ => None,
        }
    }

    /// Ports with a cached session.
    pub fn ports(&self) -> Vec<u16> {
        let mut ports: Vec<u16> = self
            .slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(port, _)| *port)
            .collect();
        ports.sort_unstable();
        ports
    }

    /// Close every cached session.
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = self
            .slots
            .lock()
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Ready(session) => Some(session),
                Slot::Opening { .. } => None,
            })
            .collect();
        for session in sessions {
            session.close().await;
        }
    }
}

async fn open_port(
    discovery: Arc<Discovery>,
    options: SessionOptions,
    port: u16,
) -> Result<Arc<Session>, CdpError> {
    let target = discovery.discover(port).await?;
    let session = Session::open(target, options).await?;
    Ok(Arc::new(session))
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
