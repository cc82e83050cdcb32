use trellis_template::{AttrKind, Node, TemplateError, parse_template_to_ast};

#[test]
fn parse_element_with_text() {
    let ast = parse_template_to_ast("<div>hi</div>").unwrap();
    assert_eq!(ast.len(), 1);
    match &ast[0] {
        Node::Element { tag, children, .. } => {
            assert_eq!(tag, "div");
            assert_eq!(children, &vec![Node::Text("hi".into())]);
        }
        _ => panic!("expected element"),
    }
}

#[test]
fn parse_directive_attributes() {
    let ast = parse_template_to_ast(
        r#"<input class="x" data-bind:value="count" data-model="form.name" oninput="onInput"/>"#,
    )
    .unwrap();
    match &ast[0] {
        Node::Element {
            attrs,
            self_closing,
            ..
        } => {
            assert!(*self_closing);
            let kinds: Vec<_> = attrs.iter().map(|a| a.kind.clone()).collect();
            assert_eq!(
                kinds,
                vec![
                    AttrKind::Static,
                    AttrKind::Bind("value".into()),
                    AttrKind::Model,
                    AttrKind::On("input".into()),
                ]
            );
            assert_eq!(attrs[2].value.as_deref(), Some("form.name"));
        }
        _ => panic!("expected element"),
    }
}

#[test]
fn valueless_and_unquoted_attributes() {
    let ast = parse_template_to_ast("<p data-if=ok>a</p><p data-else>b</p>").unwrap();
    assert_eq!(ast.len(), 2);
    assert_eq!(
        ast[0].attr("data-if").and_then(|a| a.value.as_deref()),
        Some("ok")
    );
    let else_attr = ast[1].attr("data-else").unwrap();
    assert_eq!(else_attr.value, None);
    assert_eq!(else_attr.kind, AttrKind::Else);
}

#[test]
fn expressions_with_angle_brackets_survive_quotes() {
    let ast = parse_template_to_ast(r#"<b data-if="count > 1 && count < 5">x</b>"#).unwrap();
    assert_eq!(
        ast[0].attr("data-if").and_then(|a| a.value.as_deref()),
        Some("count > 1 && count < 5")
    );
}

#[test]
fn void_elements_do_not_need_closing() {
    let ast = parse_template_to_ast("<div><input data-model=\"q\"><span>t</span></div>").unwrap();
    match &ast[0] {
        Node::Element { children, .. } => {
            assert_eq!(children.len(), 2);
            assert_eq!(children[0].tag(), Some("input"));
            assert_eq!(children[1].tag(), Some("span"));
        }
        _ => panic!("expected element"),
    }
}

#[test]
fn whitespace_text_and_comments_are_dropped() {
    let ast = parse_template_to_ast(
        "<!doctype html>\n<ul>\n  <!-- rows -->\n  <li>one</li>\n</ul>\n",
    )
    .unwrap();
    assert_eq!(ast.len(), 1);
    match &ast[0] {
        Node::Element { children, .. } => assert_eq!(children.len(), 1),
        _ => panic!("expected element"),
    }
}

#[test]
fn counts_directives_in_subtree() {
    let ast = parse_template_to_ast(
        r#"<ul><li data-for="t of todos" data-bind:key="t.id"><span data-bind:text="t.title"></span></li></ul>"#,
    )
    .unwrap();
    assert_eq!(ast[0].directive_count(), 3);
}

#[test]
fn mismatched_close_is_an_error() {
    let err = parse_template_to_ast("<div><span></div>").unwrap_err();
    assert_eq!(
        err,
        TemplateError::UnexpectedClosingTag {
            tag: "div".into(),
            offset: 11
        }
    );
}

#[test]
fn unclosed_and_malformed_input() {
    assert_eq!(
        parse_template_to_ast("<div><p>x</p>").unwrap_err(),
        TemplateError::UnclosedTag { tag: "div".into() }
    );
    assert!(matches!(
        parse_template_to_ast(r#"<p title="oops>x</p>"#),
        Err(TemplateError::UnterminatedQuote { offset: 9 })
    ));
    assert!(matches!(
        parse_template_to_ast("<p>x</p><!-- never"),
        Err(TemplateError::UnterminatedComment { .. })
    ));
    assert!(matches!(
        parse_template_to_ast("a < b"),
        Err(TemplateError::MissingTagName { offset: 2 })
    ));
}
