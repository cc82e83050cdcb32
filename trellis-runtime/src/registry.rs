//! Node to binding association with explicit cleanup.

use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;
use trellis_core::{Arena, Handle};
use trellis_dom::NodeId;

use crate::binding::Binding;

pub type BindingId = Handle<Rc<Binding>>;

#[derive(Debug, Default, Clone)]
pub struct NodeEntry {
    /// Attribute declaration order.
    pub bindings: Vec<BindingId>,
    /// Set on the root node of a loop row; rows are refreshed by their loop.
    pub row: bool,
}

/// Every live binding, addressed by generational handle and grouped by node.
#[derive(Default)]
pub struct Registry {
    bindings: Arena<Rc<Binding>>,
    nodes: IndexMap<NodeId, NodeEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, binding: Rc<Binding>) -> BindingId {
        let node = binding.node;
        let id = self.bindings.insert(binding);
        self.nodes.entry(node).or_default().bindings.push(id);
        id
    }

    pub fn mark_row(&mut self, node: NodeId) {
        self.nodes.entry(node).or_default().row = true;
    }

    pub fn is_row_root(&self, node: NodeId) -> bool {
        self.nodes.get(&node).is_some_and(|e| e.row)
    }

    /// Whether `node` already carries bindings.
    pub fn is_mapped(&self, node: NodeId) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|e| !e.bindings.is_empty())
    }

    pub fn get(&self, id: BindingId) -> Option<Rc<Binding>> {
        self.bindings.get(id).cloned()
    }

    pub fn bindings_of(&self, node: NodeId) -> Vec<Rc<Binding>> {
        self.nodes
            .get(&node)
            .map(|e| {
                e.bindings
                    .iter()
                    .filter_map(|&id| self.bindings.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop every binding of `node`. The returned bindings are already marked
    /// dead.
    pub fn remove_node(&mut self, node: NodeId) -> Vec<Rc<Binding>> {
        let Some(entry) = self.nodes.shift_remove(&node) else {
            return Vec::new();
        };
        let removed: Vec<_> = entry
            .bindings
            .into_iter()
            .filter_map(|id| self.bindings.remove(id))
            .collect();
        for binding in &removed {
            binding.kill();
        }
        if !removed.is_empty() {
            trace!(node = ?node, count = removed.len(), "bindings released");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn count_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for (_, binding) in self.bindings.iter() {
            *counts.entry(binding.kind.name()).or_insert(0) += 1;
        }
        counts
    }
}
