//! Externally submitted actions.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::automation::InjectOutcome;

/// A message a viewer wants typed into the chat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Action {
    pub message: String,
    /// Caller-chosen identifier; repeats within the window are ignored.
    #[serde(rename = "msgId", default)]
    pub msg_id: Option<String>,
    /// Send even while the page reports a response in progress.
    #[serde(default)]
    pub force: bool,
}

impl Action {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            msg_id: None,
            force: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.msg_id = Some(id.into());
        self
    }
}

/// Result of submitting an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome<T> {
    /// The action was forwarded; carries what the forward produced.
    Forwarded(T),
    /// The same identifier was forwarded within the window.
    Ignored,
}

impl<T> SubmitOutcome<T> {
    pub fn is_ignored(&self) -> bool {
        matches!(self, SubmitOutcome::Ignored)
    }
}

/// Whether a forward reached its target.
pub trait Delivery {
    fn delivered(&self) -> bool;
}

impl Delivery for InjectOutcome {
    fn delivered(&self) -> bool {
        self.ok
    }
}

/// Identifier for an action without `msgId`: same port, same text and same
/// arrival bucket give the same identifier.
pub fn derive_action_id(port: u16, message: &str, arrival_secs: u64, bucket_secs: u64) -> String {
    let bucket = arrival_secs / bucket_secs.max(1);
    let mut hasher = Sha256::new();
    hasher.update(port.to_be_bytes());
    hasher.update([0]);
    hasher.update(message.as_bytes());
    hasher.update([0]);
    hasher.update(bucket.to_be_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("auto-{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_deserialize() {
        let action: Action =
            serde_json::from_str(r#"{"message": "hi", "msgId": "m-1"}"#).unwrap();
        assert_eq!(action, Action::new("hi").with_id("m-1"));
        assert!(!action.force);
    }

    #[test]
    fn test_derived_id_stable_within_bucket() {
        let a = derive_action_id(9000, "hello", 100, 5);
        let b = derive_action_id(9000, "hello", 104, 5);
        assert_eq!(a, b);
        assert!(a.starts_with("auto-"));
    }

    #[test]
    fn test_derived_id_varies() {
        let base = derive_action_id(9000, "hello", 100, 5);
        assert_ne!(base, derive_action_id(9001, "hello", 100, 5));
        assert_ne!(base, derive_action_id(9000, "hello!", 100, 5));
        assert_ne!(base, derive_action_id(9000, "hello", 105, 5));
    }

    #[test]
    fn test_zero_bucket_does_not_panic() {
        let id = derive_action_id(9000, "x", 7, 0);
        assert!(id.starts_with("auto-"));
    }

    #[test]
    fn test_delivery_of_inject_outcome() {
        let sent = InjectOutcome {
            ok: true,
            ..Default::default()
        };
        assert!(sent.delivered());
        assert!(!InjectOutcome::default().delivered());
    }
}
