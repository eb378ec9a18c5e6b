//! Captured page content and its fingerprint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hex characters kept from the content digest.
const FINGERPRINT_LEN: usize = 16;

/// Value returned by the capture expression.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Capture {
    pub html: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub scroll_info: Option<Value>,
}

/// Fingerprint of serialized content. Only `html` takes part so scrolling
/// alone does not republish.
pub fn fingerprint(html: &str) -> String {
    let digest = Sha256::digest(html.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(FINGERPRINT_LEN);
    hex
}

/// A published state of one port's chat view.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub port: u16,
    pub html: String,
    pub css: Option<String>,
    pub scroll_info: Option<Value>,
    pub fingerprint: String,
    pub captured_at: DateTime<Utc>,
}

/// `snapshot_update` frame pushed to viewers.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotUpdate<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    html: &'a str,
    hash: &'a str,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    css: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scroll_info: Option<&'a Value>,
    captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn from_capture(port: u16, capture: Capture) -> Self {
        Self {
            port,
            fingerprint: fingerprint(&capture.html),
            html: capture.html,
            css: capture.css,
            scroll_info: capture.scroll_info,
            captured_at: Utc::now(),
        }
    }

    /// Wire form of the update.
    pub fn to_update(&self) -> Value {
        serde_json::to_value(SnapshotUpdate {
            kind: "snapshot_update",
            html: &self.html,
            hash: &self.fingerprint,
            port: self.port,
            css: self.css.as_deref(),
            scroll_info: self.scroll_info.as_ref(),
            captured_at: self.captured_at,
        })
        .unwrap_or(Value::Null)
    }
}
