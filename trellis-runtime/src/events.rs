use std::collections::HashMap;

use trellis_dom::NodeId;

use crate::registry::BindingId;

/// Event listeners installed when event bindings are bound. Listeners are
/// never part of an update pass.
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<NodeId, Vec<(String, BindingId)>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&mut self, node: NodeId, event: impl Into<String>, binding: BindingId) {
        self.handlers
            .entry(node)
            .or_default()
            .push((event.into(), binding));
    }

    pub fn remove_node(&mut self, node: NodeId) {
        self.handlers.remove(&node);
    }

    pub fn has(&self, node: NodeId, event: &str) -> bool {
        self.handlers
            .get(&node)
            .is_some_and(|hs| hs.iter().any(|(e, _)| e == event))
    }

    /// Listeners for `event` on `node`, in registration order.
    pub fn handlers(&self, node: NodeId, event: &str) -> Vec<BindingId> {
        self.handlers
            .get(&node)
            .map(|hs| {
                hs.iter()
                    .filter(|(e, _)| e == event)
                    .map(|&(_, id)| id)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
