use trellis_core::Value;
use trellis_runtime::{EngineConfig, Renderer, Runtime, StubRenderer, build_render_tree};

#[test]
fn mount_counts_nodes_and_texts() {
    let rt = Runtime::new(EngineConfig::eager());
    let root = rt
        .compile(r#"<div class="app">hi<span>there</span></div>"#)
        .unwrap();
    let tree = rt.mount(root).unwrap();
    assert_eq!(tree.node_count, 4, "div + text + span + text");
    assert_eq!(tree.text_count, 2);
    assert_eq!(rt.backend_name(), "stub");
}

#[test]
fn anchors_are_not_counted() {
    let rt = Runtime::new(EngineConfig::eager());
    let root = rt
        .compile(r#"<ul><li data-for="x of xs" data-bind:key="x">row</li></ul>"#)
        .unwrap();
    let doc = rt.document();
    let tree = build_render_tree(&doc, root);
    assert_eq!(tree.node_count, 1, "only the <ul>; the stencil is detached");
}

#[test]
fn stub_renderer_tracks_attached_roots() {
    let rt = Runtime::new(EngineConfig::eager());
    let a = rt.compile("<p>a</p>").unwrap();
    let mut renderer = StubRenderer::new();
    {
        let doc = rt.document();
        renderer.attach(&doc, a);
        assert_eq!(renderer.attached(), &[a]);
        renderer.detach(&doc, a);
    }
    assert!(renderer.attached().is_empty());
}

#[test]
fn first_pass_runs_on_the_next_turn() {
    let rt = Runtime::new(EngineConfig::eager());
    rt.state().set("name", Value::from("Ada"));
    let root = rt.compile(r#"<p data-bind:text="name"></p>"#).unwrap();
    rt.mount(root).unwrap();
    assert_eq!(rt.html(), "<p></p>");
    rt.settle().unwrap();
    assert_eq!(rt.html(), "<p>Ada</p>");
}

#[test]
fn unmount_releases_everything() {
    let rt = Runtime::new(EngineConfig::deferred(1));
    rt.state().set(
        "xs",
        Value::array((0..5).map(|i| Value::object([("id", Value::from(i))]))),
    );
    let root = rt
        .compile(
            r#"<section><button onclick="go()">go</button>
               <ul><li data-for="x of xs" data-bind:key="x.id" data-bind:text="x.id"></li></ul></section>"#,
        )
        .unwrap();
    rt.mount(root).unwrap();
    rt.tick();
    rt.tick();
    assert_eq!(rt.query_all("li").unwrap().len(), 1);
    assert!(rt.pending_tasks() > 0);

    rt.unmount(root).unwrap();
    assert_eq!(rt.binding_count(), 0);
    assert_eq!(rt.pending_tasks(), 0, "pending rows are cancelled");
    assert_eq!(rt.document().len(), 1, "only the document root is left");
}
