//! Host-neutral node tree the binding engine renders into.

pub mod document;
pub mod error;
pub mod html;
pub mod selector;

pub use document::{Document, Element, NodeData, NodeId, NodeKind, parse_style};
pub use error::DomError;
pub use html::{escape_text, is_void_element};
pub use selector::{SelectorList, SimpleSelector};

/// Build an element with the given attributes.
pub fn element<'a>(tag: &str, attrs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Element {
    let mut el = Element::new(tag);
    for (k, v) in attrs {
        el.attrs.insert(k.to_string(), v.to_string());
    }
    el
}
