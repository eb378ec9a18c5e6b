//! # chatmirror Sync
//!
//! Keeps viewers in step with an IDE's chat view: polls each watched port,
//! publishes changed snapshots to subscribers and forwards viewer messages
//! into the page exactly once per identifier.

mod actions;
mod automation;
mod dedup;
mod error;
mod hub;
mod poller;
mod service;
mod snapshot;

pub use actions::{Action, Delivery, SubmitOutcome, derive_action_id};
pub use automation::{AppState, Automation, InjectOutcome, MODES};
pub use dedup::Deduplicator;
pub use error::SyncError;
pub use hub::{Hub, SubscriberId, Subscription};
pub use poller::Poller;
pub use service::SyncService;
pub use snapshot::{Capture, Snapshot, fingerprint};
