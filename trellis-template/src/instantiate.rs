use trellis_dom::{Document, DomError, Element, NodeId};

use crate::template_ast::Node;

/// Build `nodes` into `doc` under `parent`, directive attributes included.
/// Returns the ids of the top-level nodes created.
pub fn instantiate(
    nodes: &[Node],
    doc: &mut Document,
    parent: NodeId,
) -> Result<Vec<NodeId>, DomError> {
    let mut created = Vec::with_capacity(nodes.len());
    for node in nodes {
        let id = match node {
            Node::Text(text) => doc.create_text(text.as_str()),
            Node::Element {
                tag,
                attrs,
                children,
                ..
            } => {
                let mut el = Element::new(tag.as_str());
                for attr in attrs {
                    el.attrs
                        .insert(attr.name.clone(), attr.value.clone().unwrap_or_default());
                }
                let id = doc.create_element(el);
                instantiate(children, doc, id)?;
                id
            }
        };
        doc.append_child(parent, id)?;
        created.push(id);
    }
    Ok(created)
}
