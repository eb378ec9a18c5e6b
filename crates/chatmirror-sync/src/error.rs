//! Errors raised while setting up the sync layer.

use std::path::PathBuf;

use chatmirror_cdp::CdpError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Cdp(#[from] CdpError),

    #[error("Failed to read capture script {path}: {source}")]
    CaptureScript {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid target filter: {0}")]
    Filter(String),
}
