//! # chatmirror API
//!
//! The viewer-facing surface of the relay:
//! - **HTTP**: message submission, one-shot captures, mode and model
//!   switching, the slot list and a health check
//! - **WebSocket**: a live stream of snapshot updates per viewer
//!
//! Handlers only translate between the wire and [`chatmirror_sync::SyncService`].

pub mod error;
pub mod http;
pub mod server;
pub mod state;
pub mod websocket;

pub use error::ApiError;
pub use http::routes::create_router;
pub use server::ApiServer;
pub use state::{ApiState, PortArg};
pub use websocket::WsMessage;
