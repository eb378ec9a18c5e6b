//! Execution contexts announced by the `Runtime` domain.

use std::cmp::Reverse;
use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{trace, warn};

use crate::protocol::{CdpEvent, ExecutionContextDescription, events};

/// Which JavaScript world a context belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextWorld {
    /// The frame's main page world.
    Default,
    /// An isolated world (extensions, utility scripts).
    Isolated,
}

/// A known execution context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContext {
    pub id: i64,
    pub origin: String,
    pub name: String,
    pub world: ContextWorld,
    pub frame_id: Option<String>,
    /// Creation order within the session; higher is newer.
    pub seq: u64,
}

#[derive(Default)]
struct RegistryState {
    contexts: HashMap<i64, ExecutionContext>,
    next_seq: u64,
}

/// Context set kept in sync with `Runtime` events.
#[derive(Default)]
pub(super) struct ContextRegistry {
    state: Mutex<RegistryState>,
}

impl ContextRegistry {
    pub fn apply(&self, event: &CdpEvent) {
        match event.method.as_str() {
            events::CONTEXT_CREATED => {
                let context = event.params.get("context").cloned().unwrap_or(Value::Null);
                match serde_json::from_value::<ExecutionContextDescription>(context) {
                    Ok(desc) => self.insert(desc),
                    Err(e) => warn!("Malformed executionContextCreated: {}", e),
                }
            }
            events::CONTEXT_DESTROYED => {
                if let Some(id) = event
                    .params
                    .get("executionContextId")
                    .and_then(Value::as_i64)
                {
                    self.remove(id);
                }
            }
            events::CONTEXTS_CLEARED => self.clear(),
            _ => {}
        }
    }

    pub fn insert(&self, desc: ExecutionContextDescription) {
        let world = if desc.is_default() {
            ContextWorld::Default
        } else {
            ContextWorld::Isolated
        };
        let mut state = self.state.lock();
        state.next_seq += 1;
        let context = ExecutionContext {
            id: desc.id,
            frame_id: desc.frame_id(),
            origin: desc.origin,
            name: desc.name,
            world,
            seq: state.next_seq,
        };
        trace!("Context {} created ({:?})", context.id, context.world);
        state.contexts.insert(context.id, context);
    }

    pub fn remove(&self, id: i64) -> bool {
        let removed = self.state.lock().contexts.remove(&id).is_some();
        if removed {
            trace!("Context {} destroyed", id);
        }
        removed
    }

    pub fn clear(&self) {
        self.state.lock().contexts.clear();
    }

    pub fn contains(&self, id: i64) -> bool {
        self.state.lock().contexts.contains_key(&id)
    }

    pub fn newest_first(&self) -> Vec<ExecutionContext> {
        let mut contexts: Vec<_> = self.state.lock().contexts.values().cloned().collect();
        contexts.sort_by_key(|c| Reverse(c.seq));
        contexts
    }

    /// Default-world contexts first, then the rest; newest first within each.
    pub fn preferred(&self) -> Vec<ExecutionContext> {
        let mut contexts = self.newest_first();
        contexts.sort_by_key(|c| (c.world != ContextWorld::Default, Reverse(c.seq)));
        contexts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn created(id: i64, is_default: bool) -> CdpEvent {
        CdpEvent {
            method: events::CONTEXT_CREATED.to_string(),
            params: json!({
                "context": {
                    "id": id,
                    "origin": "vscode-file://vscode-app",
                    "name": "",
                    "auxData": {"isDefault": is_default, "frameId": "F"}
                }
            }),
        }
    }

    #[test]
    fn test_created_and_destroyed() {
        let registry = ContextRegistry::default();
        registry.apply(&created(1, true));
        registry.apply(&created(2, false));
        assert!(registry.contains(1));
        assert!(registry.contains(2));

        registry.apply(&CdpEvent {
            method: events::CONTEXT_DESTROYED.to_string(),
            params: json!({"executionContextId": 1}),
        });
        assert!(!registry.contains(1));
        assert_eq!(registry.newest_first().len(), 1);
    }

    #[test]
    fn test_cleared_empties_set() {
        let registry = ContextRegistry::default();
        registry.apply(&created(1, true));
        registry.apply(&CdpEvent {
            method: events::CONTEXTS_CLEARED.to_string(),
            params: Value::Null,
        });
        assert!(registry.newest_first().is_empty());
    }

    #[test]
    fn test_preferred_order() {
        let registry = ContextRegistry::default();
        registry.apply(&created(10, false));
        registry.apply(&created(11, true));
        registry.apply(&created(12, false));
        registry.apply(&created(13, true));

        let ids: Vec<i64> = registry.preferred().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![13, 11, 12, 10]);

        let ids: Vec<i64> = registry.newest_first().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![13, 12, 11, 10]);
    }

    #[test]
    fn test_malformed_event_ignored() {
        let registry = ContextRegistry::default();
        registry.apply(&CdpEvent {
            method: events::CONTEXT_CREATED.to_string(),
            params: json!({"context": "bogus"}),
        });
        assert!(registry.newest_first().is_empty());
    }
}
