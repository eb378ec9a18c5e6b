//! WebSocket interface module.
//!
//! Each connection is one hub subscriber. Snapshots for the watched port are
//! pushed as `snapshot_update` frames; viewers switch ports and send logs
//! over the same socket.

mod handler;
mod message;

pub use handler::ws_handler;
pub use message::WsMessage;
