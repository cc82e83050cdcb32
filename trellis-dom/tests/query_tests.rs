use trellis_dom::{Document, DomError, NodeId, element};

fn sample() -> (Document, Vec<NodeId>) {
    let mut doc = Document::new();
    let root = doc.root();
    let main = doc.create_element(element("main", [("id", "app")]));
    doc.append_child(root, main).unwrap();
    let ul = doc.create_element(element("ul", [("class", "todos")]));
    doc.append_child(main, ul).unwrap();
    let mut items = vec![main, ul];
    for (i, class) in ["done", "", "done urgent"].into_iter().enumerate() {
        let li = doc.create_element(element("li", [("class", class)]));
        doc.set_attr(li, "data-id", i.to_string()).unwrap();
        let text = doc.create_text(format!("item {i}"));
        doc.append_child(li, text).unwrap();
        doc.append_child(ul, li).unwrap();
        items.push(li);
    }
    (doc, items)
}

#[test]
fn tag_class_and_id_selectors() {
    let (doc, ids) = sample();
    let root = doc.root();
    assert_eq!(doc.query_all(root, "li").unwrap(), ids[2..].to_vec());
    assert_eq!(doc.query_all(root, ".done").unwrap(), vec![ids[2], ids[4]]);
    assert_eq!(doc.query_all(root, "li.done.urgent").unwrap(), vec![ids[4]]);
    assert_eq!(doc.query(root, "#app").unwrap(), Some(ids[0]));
}

#[test]
fn attribute_and_descendant_selectors() {
    let (doc, ids) = sample();
    let root = doc.root();
    assert_eq!(doc.query_all(root, "[data-id]").unwrap().len(), 3);
    assert_eq!(doc.query_all(root, "[data-id=\"1\"]").unwrap(), vec![ids[3]]);
    assert_eq!(doc.query_all(root, "main li.done").unwrap(), vec![ids[2], ids[4]]);
    assert!(doc.query_all(root, "ol li").unwrap().is_empty());
}

#[test]
fn groups_keep_document_order() {
    let (doc, ids) = sample();
    assert_eq!(
        doc.query_all(doc.root(), "li.urgent, ul").unwrap(),
        vec![ids[1], ids[4]]
    );
}

#[test]
fn query_scope_excludes_the_scope_node() {
    let (doc, ids) = sample();
    assert_eq!(doc.query_all(ids[1], "ul").unwrap(), Vec::<NodeId>::new());
    assert_eq!(doc.query_all(ids[1], "*").unwrap(), ids[2..].to_vec());
}

#[test]
fn invalid_selector_is_reported() {
    let (doc, _) = sample();
    assert!(matches!(
        doc.query_all(doc.root(), "li[data-id"),
        Err(DomError::InvalidSelector { .. })
    ));
}

#[test]
fn html_serialisation_skips_anchors_and_escapes() {
    let mut doc = Document::new();
    let root = doc.root();
    let p = doc.create_element(element("p", [("title", "a \"b\"")]));
    doc.append_child(root, p).unwrap();
    let anchor = doc.create_anchor("for");
    doc.append_child(p, anchor).unwrap();
    let t = doc.create_text("1 < 2 & 3");
    doc.append_child(p, t).unwrap();
    let input = doc.create_element(element("input", [("disabled", "")]));
    doc.append_child(p, input).unwrap();
    assert_eq!(
        doc.to_html(root),
        r#"<p title="a &quot;b&quot;">1 &lt; 2 &amp; 3<input disabled></p>"#
    );
}

#[test]
fn clone_subtree_is_deep_and_detached() {
    let (mut doc, ids) = sample();
    let copy = doc.clone_subtree(ids[1]).unwrap();
    assert_eq!(doc.parent(copy), None);
    assert!(!doc.is_attached(copy));
    assert_eq!(doc.children(copy).len(), 3);
    assert_eq!(doc.to_html(copy), doc.to_html(ids[1]));
    doc.set_attr(doc.children(copy)[0], "class", "changed").unwrap();
    assert_eq!(doc.attr(ids[2], "class"), Some("done"));
}
