use std::cell::RefCell;
use std::rc::Rc;

use proptest::prelude::*;
use trellis_core::Value;
use trellis_dom::NodeId;
use trellis_runtime::{AggregateError, BindingError, EngineConfig, Runtime};

const LIST: &str = r#"<ul><li data-for="item of items" data-bind:key="item.k" data-bind:text="track(item.v)"></li></ul>"#;

fn item(k: i32, v: &str) -> Value {
    Value::object([("k", Value::from(k)), ("v", Value::from(v))])
}

fn keys(ks: &[i32]) -> Value {
    Value::array(ks.iter().map(|&k| Value::object([("k", Value::from(k))])))
}

/// Runtime with the list mounted and a `track` method counting row refreshes.
fn list_runtime(config: EngineConfig) -> (Runtime, Rc<RefCell<usize>>) {
    let rt = Runtime::new(config);
    let calls = Rc::new(RefCell::new(0));
    let c = calls.clone();
    rt.define_method("track", move |args| {
        *c.borrow_mut() += 1;
        Ok(args.first().cloned().unwrap_or_default())
    });
    let root = rt.compile(LIST).unwrap();
    rt.mount(root).unwrap();
    (rt, calls)
}

fn rows(rt: &Runtime) -> Vec<NodeId> {
    rt.query_all("li").unwrap()
}

fn row_keys(rt: &Runtime) -> Vec<String> {
    let doc = rt.document();
    rows(rt)
        .into_iter()
        .map(|li| doc.attr(li, "key").unwrap_or_default().to_string())
        .collect()
}

fn row_texts(rt: &Runtime) -> Vec<String> {
    let doc = rt.document();
    rows(rt).into_iter().map(|li| doc.text_content(li)).collect()
}

#[test]
fn reorder_reuses_every_row() {
    let (rt, calls) = list_runtime(EngineConfig::eager());
    rt.state()
        .set("items", Value::array([item(1, "a"), item(2, "b"), item(3, "c")]));
    rt.settle().unwrap();
    let before = rows(&rt);
    assert_eq!(row_texts(&rt), ["a", "b", "c"]);
    assert_eq!(*calls.borrow(), 3);

    rt.state()
        .set("items", Value::array([item(2, "b"), item(1, "a"), item(3, "c")]));
    rt.settle().unwrap();
    let after = rows(&rt);
    assert_eq!(after, vec![before[1], before[0], before[2]], "no creates or removes");
    assert_eq!(row_texts(&rt), ["b", "a", "c"]);
    assert_eq!(*calls.borrow(), 5, "only the two moved rows are revisited");
}

#[test]
fn removed_keys_go_and_new_keys_are_created_once() {
    let (rt, calls) = list_runtime(EngineConfig::eager());
    rt.state().set("items", keys(&[1, 2]));
    rt.settle().unwrap();
    let before = rows(&rt);

    rt.state().set("items", keys(&[2, 3]));
    rt.settle().unwrap();
    let after = rows(&rt);
    assert_eq!(after.len(), 2);
    assert_eq!(after[0], before[1], "row 2 is kept");
    assert!(!before.contains(&after[1]), "row 3 is new");
    assert!(!rt.document().contains(before[0]), "row 1 is destroyed");
    assert_eq!(row_keys(&rt), ["2", "3"]);
    // After removing row 1, row 2 is already in place; only row 3 runs.
    assert_eq!(*calls.borrow(), 3);
}

#[test]
fn pure_removal_touches_no_survivor() {
    let (rt, calls) = list_runtime(EngineConfig::eager());
    rt.state().set("items", keys(&[1, 2, 3]));
    rt.settle().unwrap();
    rt.state().set("items", keys(&[1, 3]));
    rt.settle().unwrap();
    assert_eq!(row_keys(&rt), ["1", "3"]);
    assert_eq!(*calls.borrow(), 3);
}

#[test]
fn changed_item_under_same_key_is_patched() {
    let (rt, _) = list_runtime(EngineConfig::eager());
    rt.state().set("items", Value::array([item(1, "a"), item(2, "b")]));
    rt.settle().unwrap();
    let before = rows(&rt);
    rt.state().set("items", Value::array([item(1, "a"), item(2, "B")]));
    rt.settle().unwrap();
    assert_eq!(rows(&rt), before);
    assert_eq!(row_texts(&rt), ["a", "B"]);
}

#[test]
fn unrelated_state_changes_skip_the_loop() {
    let (rt, calls) = list_runtime(EngineConfig::eager());
    rt.state().set("items", keys(&[1, 2, 3]));
    rt.settle().unwrap();
    rt.state().set("other", Value::from(1));
    rt.settle().unwrap();
    assert_eq!(*calls.borrow(), 3);
}

#[test]
fn deferred_rows_arrive_over_turns() {
    let (rt, _) = list_runtime(EngineConfig::deferred(2));
    rt.state().set("items", keys(&[1, 2, 3, 4, 5]));
    rt.tick();
    assert!(rows(&rt).is_empty(), "the first pass only schedules rows");
    rt.tick();
    assert_eq!(row_keys(&rt), ["1", "2"]);
    rt.tick();
    assert_eq!(row_keys(&rt), ["1", "2", "3", "4"]);
    rt.settle().unwrap();
    assert_eq!(row_keys(&rt), ["1", "2", "3", "4", "5"]);
}

#[test]
fn newer_list_supersedes_pending_rows() {
    let (rt, calls) = list_runtime(EngineConfig::deferred(2));
    rt.state().set("items", keys(&[1, 2, 3, 4, 5, 6]));
    rt.tick();
    assert!(rt.pending_tasks() > 0);

    rt.state().set("items", keys(&[10, 11, 12]));
    rt.update(&[]).unwrap();
    rt.settle().unwrap();
    assert_eq!(row_keys(&rt), ["10", "11", "12"]);
    assert_eq!(*calls.borrow(), 3, "stale rows were never created");
    assert_eq!(rt.pending_tasks(), 0);
}

#[test]
fn supersession_after_partial_creation_converges() {
    let (rt, _) = list_runtime(EngineConfig::deferred(1));
    rt.state().set("items", keys(&[1, 2, 3, 4]));
    rt.tick();
    rt.tick();
    assert_eq!(row_keys(&rt), ["1"]);

    rt.state().set("items", keys(&[4, 1, 9]));
    rt.settle().unwrap();
    assert_eq!(row_keys(&rt), ["4", "1", "9"]);
}

#[test]
fn failing_row_does_not_block_siblings() {
    let rt = Runtime::new(EngineConfig::eager());
    let reports: Rc<RefCell<Vec<AggregateError>>> = Rc::default();
    let r = reports.clone();
    rt.on_error(move |error| r.borrow_mut().push(error.clone()));
    rt.define_method("check", |args| match args.first().and_then(Value::as_str) {
        Some("bad") => Err("rejected".to_string()),
        _ => Ok(args.first().cloned().unwrap_or_default()),
    });
    let root = rt
        .compile(r#"<ul><li data-for="item of items" data-bind:key="item.k" data-bind:text="check(item.v)"></li></ul>"#)
        .unwrap();
    rt.mount(root).unwrap();
    rt.state()
        .set("items", Value::array([item(1, "ok"), item(2, "bad"), item(3, "fine")]));
    rt.settle().unwrap();

    assert_eq!(row_texts(&rt), ["ok", "", "fine"]);
    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].len(), 1);
}

#[test]
fn duplicate_keys_leave_rows_unchanged() {
    let rt = Runtime::new(EngineConfig::eager());
    let reports: Rc<RefCell<Vec<AggregateError>>> = Rc::default();
    let r = reports.clone();
    rt.on_error(move |error| r.borrow_mut().push(error.clone()));
    let root = rt
        .compile(r#"<ul><li data-for="item of items" data-bind:key="item.k"></li></ul>"#)
        .unwrap();
    rt.mount(root).unwrap();
    rt.state().set("items", keys(&[1, 2]));
    rt.settle().unwrap();

    rt.state().set("items", keys(&[3, 3]));
    rt.settle().unwrap();
    assert_eq!(row_keys(&rt), ["1", "2"]);
    assert!(matches!(
        reports.borrow()[0].failures[0].1,
        BindingError::DuplicateKey { .. }
    ));

    rt.state().set("items", keys(&[3]));
    rt.settle().unwrap();
    assert_eq!(row_keys(&rt), ["3"]);
}

#[test]
fn non_iterables_are_reported() {
    let rt = Runtime::new(EngineConfig::eager());
    let root = rt
        .compile(r#"<ul><li data-for="item of items" data-bind:key="item"></li></ul>"#)
        .unwrap();
    rt.mount(root).unwrap();
    rt.state().set("items", Value::from(5));
    let error = rt.update(&[]).unwrap_err();
    assert!(error.to_string().contains("got number"));
}

#[test]
fn missing_key_is_fatal_and_registers_nothing() {
    let rt = Runtime::new(EngineConfig::eager());
    let err = rt
        .compile(r#"<div data-bind:title="t"><ul><li data-for="item of items" data-bind:text="item"></li></ul></div>"#)
        .unwrap_err();
    assert_eq!(
        err,
        trellis_runtime::ConfigError::MissingKey {
            expression: "item of items".into()
        }
    );
    assert!(err.to_string().contains("item of items"));
    assert_eq!(rt.binding_count(), 0);
}

#[test]
fn broken_stencil_fails_at_compile_time() {
    let rt = Runtime::new(EngineConfig::eager());
    let err = rt
        .compile(r#"<ul><li data-for="x of xs" data-bind:key="x"><b data-bind:text="x +"></b></li></ul>"#)
        .unwrap_err();
    assert!(matches!(err, trellis_runtime::ConfigError::Expression { .. }));
}

#[test]
fn template_stencils_and_object_iteration() {
    let rt = Runtime::new(EngineConfig::eager());
    rt.state().set(
        "groups",
        Value::object([("beta", Value::from(2)), ("alpha", Value::from(1))]),
    );
    let root = rt
        .compile(
            r#"<ul><template data-for="name in groups"><li data-bind:key="name" data-bind:text="name + '=' + groups[name]"></li></template></ul>"#,
        )
        .unwrap();
    rt.mount(root).unwrap();
    rt.settle().unwrap();
    assert_eq!(
        rt.html(),
        r#"<ul><li key="alpha">alpha=1</li><li key="beta">beta=2</li></ul>"#
    );
}

#[test]
fn nested_loops_and_row_scopes() {
    let rt = Runtime::new(EngineConfig::eager());
    rt.state().set(
        "groups",
        Value::array([
            Value::object([("id", Value::from("a")), ("tags", Value::array([Value::from("x"), Value::from("y")]))]),
            Value::object([("id", Value::from("b")), ("tags", Value::array([Value::from("z")]))]),
        ]),
    );
    let root = rt
        .compile(
            r#"<div data-for="g of groups" data-bind:key="g.id"><i data-for="t of g.tags" data-bind:key="t" data-bind:text="g.id + t"></i></div>"#,
        )
        .unwrap();
    rt.mount(root).unwrap();
    rt.settle().unwrap();
    let texts: Vec<String> = {
        let doc = rt.document();
        rt.query_all("i")
            .unwrap()
            .into_iter()
            .map(|n| doc.text_content(n))
            .collect()
    };
    assert_eq!(texts, ["ax", "ay", "bz"]);
}

#[test]
fn row_conditions_gate_row_bindings() {
    let rt = Runtime::new(EngineConfig::eager());
    rt.state().set(
        "todos",
        Value::array([
            Value::object([("id", Value::from(1)), ("done", Value::from(true))]),
            Value::object([("id", Value::from(2)), ("done", Value::from(false))]),
        ]),
    );
    let root = rt
        .compile(r#"<ul><li data-for="t of todos" data-bind:key="t.id" data-if="!t.done">open</li></ul>"#)
        .unwrap();
    rt.mount(root).unwrap();
    rt.settle().unwrap();
    let doc = rt.document();
    let lis = rt.query_all("li").unwrap();
    assert!(doc.has_attr(lis[0], "inert"));
    assert!(!doc.has_attr(lis[1], "inert"));
}

fn todo(id: i32, name: &str) -> Value {
    Value::object([("id", Value::from(id)), ("name", Value::from(name))])
}

#[test]
fn kept_rows_follow_component_state() {
    let rt = Runtime::new(EngineConfig::eager());
    let calls = Rc::new(RefCell::new(0));
    let c = calls.clone();
    rt.define_method("track", move |args| {
        *c.borrow_mut() += 1;
        Ok(args.first().cloned().unwrap_or_default())
    });
    rt.state().set("todos", Value::array([todo(1, "a"), todo(2, "b")]));
    let root = rt
        .compile(
            r#"<ul><li data-for="t of todos" data-bind:key="t.id" data-bind:class="editing === t.id ? 'edit' : 'view'" data-bind:text="track(t.name)"></li></ul>"#,
        )
        .unwrap();
    rt.mount(root).unwrap();
    rt.settle().unwrap();
    let classes = |rt: &Runtime| -> Vec<String> {
        let doc = rt.document();
        rows(rt)
            .into_iter()
            .map(|li| doc.attr(li, "class").unwrap_or_default().to_string())
            .collect()
    };
    assert_eq!(classes(&rt), ["view", "view"]);
    let before = rows(&rt);

    rt.state().set("editing", Value::from(2));
    rt.settle().unwrap();
    assert_eq!(classes(&rt), ["view", "edit"]);
    assert_eq!(rows(&rt), before);
    assert_eq!(*calls.borrow(), 2, "item-only bindings are not re-run");
}

#[test]
fn hidden_rows_skip_state_refresh() {
    let rt = Runtime::new(EngineConfig::eager());
    let calls = Rc::new(RefCell::new(0));
    let c = calls.clone();
    rt.define_method("track", move |args| {
        *c.borrow_mut() += 1;
        Ok(args.first().cloned().unwrap_or_default())
    });
    rt.state().set("label", Value::from("x"));
    rt.state().set(
        "todos",
        Value::array([
            Value::object([("id", Value::from(1)), ("done", Value::from(true))]),
            Value::object([("id", Value::from(2)), ("done", Value::from(false))]),
        ]),
    );
    let root = rt
        .compile(r#"<ul><li data-for="t of todos" data-bind:key="t.id" data-if="!t.done"><b data-bind:text="track(label)"></b></li></ul>"#)
        .unwrap();
    rt.mount(root).unwrap();
    rt.settle().unwrap();
    assert_eq!(*calls.borrow(), 1);

    rt.state().set("label", Value::from("y"));
    rt.settle().unwrap();
    assert_eq!(*calls.borrow(), 2);
    assert_eq!(row_texts(&rt), ["", "y"]);
}

#[test]
fn row_model_input_updates_the_list_in_state() {
    let rt = Runtime::new(EngineConfig::eager());
    rt.state().set("todos", Value::array([todo(1, "a"), todo(2, "b")]));
    let root = rt
        .compile(r#"<ul><li data-for="t of todos" data-bind:key="t.id"><input data-model="t.name"></li></ul>"#)
        .unwrap();
    rt.mount(root).unwrap();
    rt.settle().unwrap();
    let before = rows(&rt);
    let inputs = rt.query_all("input").unwrap();

    rt.input(inputs[0], Value::from("typed")).unwrap();
    let todos = rt.state().get("todos");
    assert_eq!(todos.get("0").get("name"), Value::from("typed"));
    assert_eq!(todos.get("1").get("name"), Value::from("b"));

    rt.settle().unwrap();
    assert_eq!(rows(&rt), before, "the row is patched, not rebuilt");
    assert_eq!(rt.document().property(inputs[0], "value"), Value::from("typed"));

    // Writes follow the row's key after a reorder.
    rt.state().set("todos", Value::array([todo(2, "b"), todo(1, "typed")]));
    rt.settle().unwrap();
    let inputs = rt.query_all("input").unwrap();
    rt.input(inputs[1], Value::from("again")).unwrap();
    let todos = rt.state().get("todos");
    assert_eq!(todos.get("0").get("name"), Value::from("b"));
    assert_eq!(todos.get("1").get("name"), Value::from("again"));
}

proptest! {
    #[test]
    fn rows_converge_to_the_latest_list(
        lists in prop::collection::vec(
            prop::sample::subsequence((0i32..16).collect::<Vec<_>>(), 0..=16).prop_shuffle(),
            1..6,
        ),
        ticks in prop::collection::vec(0usize..3, 6),
        per_turn in 1usize..4,
    ) {
        let (rt, _) = list_runtime(EngineConfig::deferred(per_turn));
        for (list, &turns) in lists.iter().zip(&ticks) {
            rt.state().set("items", keys(list));
            for _ in 0..turns {
                rt.tick();
            }
        }
        rt.settle().unwrap();

        let expected: Vec<String> = lists.last().unwrap().iter().map(|k| k.to_string()).collect();
        prop_assert_eq!(row_keys(&rt), expected);
        prop_assert_eq!(rt.pending_tasks(), 0);
    }
}
