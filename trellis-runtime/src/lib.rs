//! Binding engine: maps parsed templates into bindings, runs coalesced
//! update passes and reconciles keyed lists.

use trellis_dom::{Document, NodeId, NodeKind};

pub mod binding;
pub mod component;
pub mod config;
pub mod error;
pub mod events;
mod mapper;
mod pass;
pub mod reconcile;
pub mod registry;
mod runtime;

pub use binding::{Binding, BindingKind, Flow};
pub use component::{Component, ComponentFactory, ErrorHandler};
pub use config::{EngineConfig, RowCreation};
pub use error::{AggregateError, BindingError, ConfigError, UpdateError};
pub use registry::{BindingId, Registry};
pub use runtime::Runtime;

/// Summary of a subtree handed to a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTree {
    pub root: NodeId,
    pub node_count: usize,
    pub text_count: usize,
}

fn summarize(doc: &Document, node: NodeId, counts: &mut (usize, usize)) {
    match doc.kind(node) {
        Some(NodeKind::Text(_)) => {
            counts.0 += 1;
            counts.1 += 1;
        }
        Some(NodeKind::Element(_)) => {
            counts.0 += 1;
            for &child in doc.children(node) {
                summarize(doc, child, counts);
            }
        }
        Some(NodeKind::Root | NodeKind::Fragment) => {
            for &child in doc.children(node) {
                summarize(doc, child, counts);
            }
        }
        Some(NodeKind::Anchor(_)) | None => {}
    }
}

pub fn build_render_tree(doc: &Document, node: NodeId) -> RenderTree {
    let mut counts = (0, 0);
    summarize(doc, node, &mut counts);
    RenderTree {
        root: node,
        node_count: counts.0,
        text_count: counts.1,
    }
}

/// Host collaborator notified when subtrees enter or leave the document.
pub trait Renderer {
    fn backend_name(&self) -> &'static str;
    fn attach(&mut self, doc: &Document, node: NodeId) -> RenderTree;
    fn detach(&mut self, _doc: &Document, _node: NodeId) {}
}

/// Renderer that only keeps track of what is attached.
#[derive(Debug, Default)]
pub struct StubRenderer {
    attached: Vec<NodeId>,
}

impl StubRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(&self) -> &[NodeId] {
        &self.attached
    }
}

impl Renderer for StubRenderer {
    fn backend_name(&self) -> &'static str {
        "stub"
    }

    fn attach(&mut self, doc: &Document, node: NodeId) -> RenderTree {
        self.attached.push(node);
        build_render_tree(doc, node)
    }

    fn detach(&mut self, _doc: &Document, node: NodeId) {
        self.attached.retain(|&n| n != node);
    }
}
