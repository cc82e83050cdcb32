//! Observable key/value state with fingerprint de-duplication.
//!
//! Every write is fingerprinted; only writes that change the fingerprint of
//! their key request an update pass. Inside a locked batch the request is
//! held back and issued once when the outermost lock is released.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::trace;

use crate::scope::Namespace;
use crate::value::{Value, fingerprint};

#[derive(Default)]
struct StateInner {
    values: RefCell<BTreeMap<String, Value>>,
    fingerprints: RefCell<HashMap<String, String>>,
    lock_depth: Cell<usize>,
    dirty: Cell<bool>,
    requests: Cell<u64>,
    notify: RefCell<Option<Rc<dyn Fn()>>>,
}

/// Shared handle to a reactive state mapping.
#[derive(Clone, Default)]
pub struct State {
    inner: Rc<StateInner>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a key. Missing keys resolve to [`Value::Null`].
    pub fn get(&self, key: &str) -> Value {
        self.inner
            .values
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.values.borrow().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.values.borrow().keys().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.values.borrow().clone()
    }

    /// Store `value` under `key`. Returns whether the fingerprint changed.
    ///
    /// The value is stored either way; only a changed fingerprint requests an
    /// update pass.
    pub fn set(&self, key: impl Into<String>, value: Value) -> bool {
        let key = key.into();
        let print = fingerprint(&value);
        let changed = {
            let mut prints = self.inner.fingerprints.borrow_mut();
            if prints.get(&key) == Some(&print) {
                false
            } else {
                prints.insert(key.clone(), print);
                true
            }
        };
        self.inner.values.borrow_mut().insert(key.clone(), value);

        if !changed {
            trace!(key = %key, "state write unchanged");
            return false;
        }
        trace!(key = %key, "state mutated");
        if self.is_locked() {
            self.inner.dirty.set(true);
        } else {
            self.request_update();
        }
        true
    }

    /// Install the callback invoked when an update pass is needed.
    pub fn on_change(&self, f: impl Fn() + 'static) {
        *self.inner.notify.borrow_mut() = Some(Rc::new(f));
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock_depth.get() > 0
    }

    /// Number of update requests issued so far.
    pub fn update_requests(&self) -> u64 {
        self.inner.requests.get()
    }

    /// Hold back update requests until the returned guard is dropped.
    pub fn lock(&self) -> BatchGuard {
        self.inner.lock_depth.set(self.inner.lock_depth.get() + 1);
        BatchGuard {
            state: self.clone(),
            flush: true,
        }
    }

    /// Run `f` inside a locked batch and flush once afterwards.
    pub fn batch<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let _guard = self.lock();
        f(self)
    }

    /// Like [`State::batch`], but changes made inside never request a pass.
    pub fn batch_silent<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        let mut guard = self.lock();
        guard.flush = false;
        f(self)
    }

    fn unlock(&self, flush: bool) {
        let depth = self.inner.lock_depth.get().saturating_sub(1);
        self.inner.lock_depth.set(depth);
        if depth > 0 {
            return;
        }
        let dirty = self.inner.dirty.replace(false);
        if dirty && flush {
            self.request_update();
        }
    }

    fn request_update(&self) {
        self.inner.requests.set(self.inner.requests.get() + 1);
        // Clone the callback out so it can write state re-entrantly.
        let notify = self.inner.notify.borrow().clone();
        if let Some(notify) = notify {
            notify();
        }
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for State {
    /// Seed initial values without requesting updates.
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let state = State::new();
        {
            let mut values = state.inner.values.borrow_mut();
            let mut prints = state.inner.fingerprints.borrow_mut();
            for (k, v) in iter {
                let k = k.into();
                prints.insert(k.clone(), fingerprint(&v));
                values.insert(k, v);
            }
        }
        state
    }
}

impl std::fmt::Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.inner.values.borrow().iter()).finish()
    }
}

impl Namespace for State {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.inner.values.borrow().get(name).cloned()
    }

    fn assign(&self, name: &str, value: Value) {
        self.set(name, value);
    }
}

/// Releases one level of a locked batch on drop.
pub struct BatchGuard {
    state: State,
    flush: bool,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.state.unlock(self.flush);
    }
}
