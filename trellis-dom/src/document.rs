use std::collections::BTreeMap;

use indexmap::IndexMap;
use tracing::trace;
use trellis_core::{Arena, Handle, Value};

use crate::error::DomError;
use crate::selector::SelectorList;

pub type NodeId = Handle<NodeData>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    /// Declaration order is kept; directive extraction depends on it.
    pub attrs: IndexMap<String, String>,
    /// Live properties (`value`, `checked`, ...) that are not serialised.
    pub properties: BTreeMap<String, Value>,
    /// Inline style, parsed out of the `style` attribute.
    pub style: IndexMap<String, String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attrs
            .get("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Document root; holds top-level nodes.
    Root,
    /// Detached container for a compiled template; serialises as its children.
    Fragment,
    Element(Element),
    Text(String),
    /// Invisible placeholder marking where a loop renders its rows.
    Anchor(String),
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// Arena-backed node tree. Node identity is a generational handle, so a
/// handle to a removed node never aliases a newer one.
pub struct Document {
    nodes: Arena<NodeData>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut nodes = Arena::new();
        let root = nodes.insert(NodeData::new(NodeKind::Root));
        Self { nodes, root }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(node)
    }

    fn data(&self, node: NodeId) -> Result<&NodeData, DomError> {
        self.nodes.get(node).ok_or(DomError::UnknownNode)
    }

    fn data_mut(&mut self, node: NodeId) -> Result<&mut NodeData, DomError> {
        self.nodes.get_mut(node).ok_or(DomError::UnknownNode)
    }

    // ----- creation -----

    pub fn create_element(&mut self, element: Element) -> NodeId {
        let mut element = element;
        if let Some(style) = element.attrs.get("style") {
            element.style = parse_style(style);
        }
        self.nodes.insert(NodeData::new(NodeKind::Element(element)))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.nodes.insert(NodeData::new(NodeKind::Text(text.into())))
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.nodes.insert(NodeData::new(NodeKind::Fragment))
    }

    pub fn create_anchor(&mut self, label: impl Into<String>) -> NodeId {
        self.nodes
            .insert(NodeData::new(NodeKind::Anchor(label.into())))
    }

    /// Deep copy of `node`, detached from the tree.
    pub fn clone_subtree(&mut self, node: NodeId) -> Result<NodeId, DomError> {
        let (kind, children) = {
            let data = self.data(node)?;
            (data.kind.clone(), data.children.clone())
        };
        let copy = self.nodes.insert(NodeData::new(kind));
        for child in children {
            let child_copy = self.clone_subtree(child)?;
            self.append_child(copy, child_copy)?;
        }
        Ok(copy)
    }

    // ----- structure -----

    pub fn kind(&self, node: NodeId) -> Option<&NodeKind> {
        self.nodes.get(node).map(|d| &d.kind)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node).and_then(|d| d.parent)
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(node)
            .map(|d| d.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let siblings = self.children(self.parent(node)?);
        let pos = siblings.iter().position(|&n| n == node)?;
        siblings.get(pos + 1).copied()
    }

    /// Whether `node` is reachable from the document root.
    pub fn is_attached(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == self.root {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Pre-order walk of `node` and everything below it.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if !self.contains(node) {
            return out;
        }
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.children(n).iter().rev().copied());
        }
        out
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.data(child)?;
        match self.data(parent)?.kind {
            NodeKind::Root | NodeKind::Fragment | NodeKind::Element(_) => {}
            _ => return Err(DomError::NotAContainer),
        }
        if parent == child || self.is_ancestor(child, parent) {
            return Err(DomError::Cycle);
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.data_mut(parent)?.children.push(child);
        self.data_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Insert `node` directly after `reference` under the same parent.
    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> Result<(), DomError> {
        if reference == node {
            return Ok(());
        }
        let parent = self.parent(reference).ok_or(DomError::Detached)?;
        self.check_insert(parent, node)?;
        self.detach(node)?;
        let siblings = &mut self.data_mut(parent)?.children;
        let pos = siblings
            .iter()
            .position(|&n| n == reference)
            .ok_or(DomError::Detached)?;
        siblings.insert(pos + 1, node);
        self.data_mut(node)?.parent = Some(parent);
        Ok(())
    }

    /// Swap `old` out of the tree for `new`. `old` is left detached.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<(), DomError> {
        if old == new {
            return Ok(());
        }
        self.insert_after(old, new)?;
        self.detach(old)
    }

    /// Unlink `node` from its parent without destroying it.
    pub fn detach(&mut self, node: NodeId) -> Result<(), DomError> {
        let Some(parent) = self.data(node)?.parent else {
            return Ok(());
        };
        if let Some(p) = self.nodes.get_mut(parent) {
            p.children.retain(|&n| n != node);
        }
        self.data_mut(node)?.parent = None;
        Ok(())
    }

    /// Destroy `node` and its subtree. Returns every removed id, pre-order.
    pub fn remove(&mut self, node: NodeId) -> Result<Vec<NodeId>, DomError> {
        if node == self.root {
            return Err(DomError::RootRemoval);
        }
        self.detach(node)?;
        let removed = self.descendants(node);
        for &n in &removed {
            self.nodes.remove(n);
        }
        trace!(count = removed.len(), "removed subtree");
        Ok(removed)
    }

    // ----- element data -----

    pub fn element(&self, node: NodeId) -> Option<&Element> {
        match self.kind(node)? {
            NodeKind::Element(el) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, node: NodeId) -> Result<&mut Element, DomError> {
        match &mut self.data_mut(node)?.kind {
            NodeKind::Element(el) => Ok(el),
            _ => Err(DomError::NotAnElement),
        }
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.element(node).map(|el| el.tag.as_str())
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.element(node)?.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn set_attr(
        &mut self,
        node: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), DomError> {
        let value = value.into();
        let el = self.element_mut(node)?;
        if name == "style" {
            el.style = parse_style(&value);
        }
        el.attrs.insert(name.to_string(), value);
        Ok(())
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> Result<Option<String>, DomError> {
        let el = self.element_mut(node)?;
        if name == "style" {
            el.style.clear();
        }
        Ok(el.attrs.shift_remove(name))
    }

    pub fn property(&self, node: NodeId, name: &str) -> Value {
        self.element(node)
            .and_then(|el| el.properties.get(name).cloned())
            .unwrap_or_default()
    }

    pub fn set_property(&mut self, node: NodeId, name: &str, value: Value) -> Result<(), DomError> {
        self.element_mut(node)?
            .properties
            .insert(name.to_string(), value);
        Ok(())
    }

    pub fn style(&self, node: NodeId, prop: &str) -> Option<&str> {
        self.element(node)?.style.get(prop).map(String::as_str)
    }

    pub fn set_style(
        &mut self,
        node: NodeId,
        prop: &str,
        value: impl Into<String>,
    ) -> Result<(), DomError> {
        let el = self.element_mut(node)?;
        el.style.insert(prop.to_string(), value.into());
        sync_style_attr(el);
        Ok(())
    }

    pub fn remove_style(&mut self, node: NodeId, prop: &str) -> Result<(), DomError> {
        let el = self.element_mut(node)?;
        el.style.shift_remove(prop);
        sync_style_attr(el);
        Ok(())
    }

    /// Concatenated text of the subtree.
    pub fn text_content(&self, node: NodeId) -> String {
        self.descendants(node)
            .into_iter()
            .filter_map(|n| match self.kind(n)? {
                NodeKind::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace the children of `node` with a single text node.
    pub fn set_text_content(&mut self, node: NodeId, text: &str) -> Result<(), DomError> {
        if let NodeKind::Text(t) = &mut self.data_mut(node)?.kind {
            *t = text.to_string();
            return Ok(());
        }
        let children = self.children(node).to_vec();
        for child in children {
            self.remove(child)?;
        }
        if !text.is_empty() {
            let t = self.create_text(text);
            self.append_child(node, t)?;
        }
        Ok(())
    }

    // ----- queries -----

    /// Elements under `scope` (excluding `scope` itself) matching
    /// `selector`, in document order.
    pub fn query_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let selectors = SelectorList::parse(selector)?;
        Ok(self
            .descendants(scope)
            .into_iter()
            .skip(1)
            .filter(|&n| selectors.matches(self, n))
            .collect())
    }

    pub fn query(&self, scope: NodeId, selector: &str) -> Result<Option<NodeId>, DomError> {
        Ok(self.query_all(scope, selector)?.into_iter().next())
    }
}

/// Parse `k: v; k2: v2` into ordered declarations.
pub fn parse_style(style: &str) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for decl in style.split(';') {
        let decl = decl.trim();
        if decl.is_empty() {
            continue;
        }
        if let Some((k, v)) = decl.split_once(':') {
            map.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    map
}

fn sync_style_attr(el: &mut Element) {
    if el.style.is_empty() {
        el.attrs.shift_remove("style");
        return;
    }
    let serialized = el
        .style
        .iter()
        .map(|(k, v)| format!("{k}: {v};"))
        .collect::<Vec<_>>()
        .join(" ");
    el.attrs.insert("style".to_string(), serialized);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(doc: &mut Document) -> (NodeId, Vec<NodeId>) {
        let ul = doc.create_element(Element::new("ul"));
        doc.append_child(doc.root(), ul).unwrap();
        let items = (0..3)
            .map(|_| {
                let li = doc.create_element(Element::new("li"));
                doc.append_child(ul, li).unwrap();
                li
            })
            .collect();
        (ul, items)
    }

    #[test]
    fn insert_after_moves_existing_nodes() {
        let mut doc = Document::new();
        let (ul, items) = list(&mut doc);
        doc.insert_after(items[2], items[0]).unwrap();
        assert_eq!(doc.children(ul), &[items[1], items[2], items[0]]);
        assert_eq!(doc.next_sibling(items[1]), Some(items[2]));
        assert_eq!(doc.next_sibling(items[0]), None);
    }

    #[test]
    fn removal_invalidates_handles() {
        let mut doc = Document::new();
        let (ul, items) = list(&mut doc);
        let removed = doc.remove(ul).unwrap();
        assert_eq!(removed.len(), 4);
        assert!(!doc.contains(items[1]));
        assert_eq!(doc.set_attr(items[1], "x", "y"), Err(DomError::UnknownNode));
        assert!(doc.is_empty());
    }

    #[test]
    fn cycles_are_rejected() {
        let mut doc = Document::new();
        let (ul, items) = list(&mut doc);
        assert_eq!(doc.append_child(items[0], ul), Err(DomError::Cycle));
    }

    #[test]
    fn style_attribute_and_map_stay_in_sync() {
        let mut doc = Document::new();
        let mut el = Element::new("p");
        el.attrs.insert("style".into(), "color: red; display: flex".into());
        let p = doc.create_element(el);
        assert_eq!(doc.style(p, "display"), Some("flex"));
        doc.set_style(p, "display", "none").unwrap();
        assert_eq!(doc.attr(p, "style"), Some("color: red; display: none;"));
        doc.remove_style(p, "color").unwrap();
        doc.remove_style(p, "display").unwrap();
        assert_eq!(doc.attr(p, "style"), None);
    }

    #[test]
    fn text_content_replaces_children() {
        let mut doc = Document::new();
        let (ul, _) = list(&mut doc);
        doc.set_text_content(ul, "empty").unwrap();
        assert_eq!(doc.children(ul).len(), 1);
        assert_eq!(doc.text_content(ul), "empty");
    }
}
