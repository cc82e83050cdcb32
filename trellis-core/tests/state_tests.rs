use std::cell::RefCell as StdRefCell;
use std::rc::Rc;

use trellis_core::{Scheduler, State, Value};

fn counting(state: &State) -> Rc<StdRefCell<u32>> {
    let hits = Rc::new(StdRefCell::new(0));
    let hits_clone = hits.clone();
    state.on_change(move || *hits_clone.borrow_mut() += 1);
    hits
}

#[test]
fn deep_equal_writes_request_one_update() {
    let state = State::new();
    let hits = counting(&state);

    let list = || Value::array([Value::object([("k", Value::from(1))])]);
    assert!(state.set("list", list()));
    // A freshly built but deep-equal value is not a change.
    assert!(!state.set("list", list()));
    assert_eq!(*hits.borrow(), 1);
    assert_eq!(state.get("list"), list());
}

#[test]
fn missing_keys_read_as_null() {
    let state = State::new();
    assert_eq!(state.get("nope"), Value::Null);
    assert!(!state.contains("nope"));
}

#[test]
fn locked_batch_flushes_once_after_all_writes() {
    let state = State::new();
    let seen: Rc<StdRefCell<Vec<Value>>> = Rc::new(StdRefCell::new(vec![]));
    {
        let state_cb = state.clone();
        let seen_cb = seen.clone();
        state.on_change(move || {
            seen_cb.borrow_mut().push(Value::array([
                state_cb.get("a"),
                state_cb.get("b"),
                state_cb.get("c"),
            ]));
        });
    }

    state.batch(|s| {
        s.set("a", Value::from(1));
        s.set("b", Value::from(2));
        s.set("c", Value::from(3));
    });

    assert_eq!(
        &*seen.borrow(),
        &vec![Value::array([Value::from(1), Value::from(2), Value::from(3)])]
    );
}

#[test]
fn nested_locks_flush_at_the_outermost_release() {
    let state = State::new();
    let hits = counting(&state);
    let outer = state.lock();
    {
        let _inner = state.lock();
        state.set("x", Value::from(1));
    }
    assert_eq!(*hits.borrow(), 0);
    drop(outer);
    assert_eq!(*hits.borrow(), 1);
    assert!(!state.is_locked());
}

#[test]
fn unchanged_batch_does_not_flush() {
    let state: State = [("x", Value::from(1))].into_iter().collect();
    let hits = counting(&state);
    state.batch(|s| {
        s.set("x", Value::from(1));
    });
    assert_eq!(*hits.borrow(), 0);
}

#[test]
fn silent_batch_stores_without_requesting() {
    let state = State::new();
    let hits = counting(&state);
    state.batch_silent(|s| s.set("x", Value::from(5)));
    assert_eq!(*hits.borrow(), 0);
    assert_eq!(state.get("x"), Value::from(5));
}

#[test]
fn change_requests_coalesce_on_a_scheduler() {
    // Typical host wiring: coalesce requests into one deferred pass.
    let scheduler = Scheduler::new();
    let state = State::new();
    let passes = Rc::new(StdRefCell::new(0));
    let queued = Rc::new(StdRefCell::new(false));
    {
        let scheduler = scheduler.clone();
        let passes = passes.clone();
        let queued = queued.clone();
        state.on_change(move || {
            if queued.replace(true) {
                return;
            }
            let passes = passes.clone();
            let queued = queued.clone();
            scheduler.defer(move || {
                queued.replace(false);
                *passes.borrow_mut() += 1;
            });
        });
    }

    state.set("a", Value::from(1));
    state.set("a", Value::from(2));
    state.set("b", Value::from(3));
    assert_eq!(*passes.borrow(), 0);
    scheduler.run_until_idle(8).unwrap();
    assert_eq!(*passes.borrow(), 1);
    assert_eq!(state.update_requests(), 3);
}
