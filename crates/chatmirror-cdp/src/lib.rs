//! # chatmirror CDP
//!
//! Chrome DevTools Protocol plumbing for the relay:
//!
//! - [`Discovery`] lists debuggable targets on a port and picks the IDE page.
//! - [`Session`] owns one WebSocket to a target and correlates calls by id.
//! - [`ConnectionPool`] caches one session per port with a single open
//!   attempt in flight at a time.

mod discovery;
mod error;
mod pool;
mod protocol;
mod session;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use discovery::{Discovery, SlotInfo, TargetFilter};
pub use error::CdpError;
pub use pool::ConnectionPool;
pub use protocol::{
    CdpEvent, CdpRequest, ExceptionDetails, ExecutionContextDescription, Inbound, RemoteObject,
    Target, TargetDescriptor, events,
};
pub use session::{ContextWorld, ExecutionContext, Session, SessionOptions};
