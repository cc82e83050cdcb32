//! The engine shared by bindings and scheduler tasks, and the [`Runtime`]
//! facade hosts drive it through.

use std::cell::{Cell, Ref, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::{debug, trace, warn};
use trellis_core::{BatchOutcome, Callable, Namespace, Scheduler, Scope, State, Value};
use trellis_dom::{Document, DomError, NodeId};
use trellis_template::{instantiate, parse_template_to_ast};

use crate::binding::{Binding, BindingKind};
use crate::component::{Component, ComponentFactory};
use crate::config::EngineConfig;
use crate::error::{AggregateError, BindingError, ConfigError, UpdateError};
use crate::events::EventRegistry;
use crate::registry::Registry;
use crate::{RenderTree, Renderer, StubRenderer, mapper, pass};

pub(crate) struct Engine {
    pub(crate) doc: RefCell<Document>,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) events: RefCell<EventRegistry>,
    pub(crate) scheduler: Scheduler,
    pub(crate) config: EngineConfig,
    /// Child component factories keyed by lowercase tag.
    pub(crate) components: RefCell<HashMap<String, ComponentFactory>>,
    component: Rc<Component>,
    root_scope: Scope,
    renderer: RefCell<Box<dyn Renderer>>,
    children: RefCell<HashMap<NodeId, State>>,
    pass_queued: Cell<bool>,
    in_pass: Cell<bool>,
    passes: Cell<u64>,
    /// Failures from deferred work with no handler installed, surfaced by
    /// the next `settle`.
    unhandled: RefCell<Option<AggregateError>>,
}

impl Engine {
    fn new(config: EngineConfig, renderer: Box<dyn Renderer>) -> Rc<Self> {
        let component = Rc::new(Component::default());
        let namespace: Rc<dyn Namespace> = component.clone();
        let engine = Rc::new(Self {
            doc: RefCell::new(Document::new()),
            registry: RefCell::new(Registry::new()),
            events: RefCell::new(EventRegistry::new()),
            scheduler: Scheduler::new(),
            config,
            components: RefCell::new(HashMap::new()),
            component,
            root_scope: Scope::new(namespace),
            renderer: RefCell::new(renderer),
            children: RefCell::new(HashMap::new()),
            pass_queued: Cell::new(false),
            in_pass: Cell::new(false),
            passes: Cell::new(0),
            unhandled: RefCell::new(None),
        });
        let weak = Rc::downgrade(&engine);
        engine.component.state().on_change(move || {
            if let Some(engine) = weak.upgrade() {
                engine.request_pass();
            }
        });
        engine
    }

    /// Map a freshly cloned row and mark it as owned by its loop.
    pub(crate) fn map_row(self: &Rc<Self>, node: NodeId, scope: &Scope) -> Result<usize, ConfigError> {
        let count = mapper::map(self, &[node], scope)?;
        self.registry.borrow_mut().mark_row(node);
        Ok(count)
    }

    pub(crate) fn child_state(&self, node: NodeId) -> Option<State> {
        self.children.borrow().get(&node).cloned()
    }

    /// Instantiate the child surface for a component node once.
    pub(crate) fn ensure_child(&self, node: NodeId) -> Result<(), ConfigError> {
        if self.children.borrow().contains_key(&node) {
            return Ok(());
        }
        let tag = self
            .doc
            .borrow()
            .tag(node)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let factory = self.components.borrow().get(&tag).cloned();
        let Some(factory) = factory else {
            return Err(ConfigError::UnknownComponent {
                tag,
                attribute: "data-state".to_string(),
            });
        };
        let state = factory();
        trace!(tag = %tag, "child component created");
        self.children.borrow_mut().insert(node, state);
        Ok(())
    }

    /// Drop every binding, listener and child surface under `node`. Loops
    /// found on the way tear down their rows and pending work.
    pub(crate) fn release_subtree(self: &Rc<Self>, node: NodeId) {
        let nodes = self.doc.borrow().descendants(node);
        for n in nodes {
            let removed = self.registry.borrow_mut().remove_node(n);
            self.events.borrow_mut().remove_node(n);
            self.children.borrow_mut().remove(&n);
            for binding in removed {
                if let BindingKind::Loop(site) = &binding.kind {
                    site.release(self);
                }
            }
        }
    }

    /// Release and destroy `node`.
    pub(crate) fn discard(self: &Rc<Self>, node: NodeId) -> Result<(), DomError> {
        self.release_subtree(node);
        let mut doc = self.doc.borrow_mut();
        if doc.contains(node) {
            doc.remove(node)?;
        }
        Ok(())
    }

    /// Queue one pass over the whole document for the next scheduler turn.
    /// Requests made before it runs collapse into it.
    pub(crate) fn request_pass(self: &Rc<Self>) {
        if self.pass_queued.replace(true) {
            return;
        }
        let weak = Rc::downgrade(self);
        self.scheduler.defer(move || {
            if let Some(engine) = weak.upgrade() {
                engine.pass_queued.set(false);
                engine.deferred_pass();
            }
        });
        trace!("update pass requested");
    }

    fn deferred_pass(self: &Rc<Self>) {
        let root = self.doc.borrow().root();
        match self.run_pass(&[root]) {
            Ok(outcome) => self.report_background(outcome),
            Err(err) => warn!(error = %err, "deferred pass skipped"),
        }
    }

    fn run_pass(self: &Rc<Self>, roots: &[NodeId]) -> Result<BatchOutcome<BindingError>, UpdateError> {
        if self.in_pass.replace(true) {
            return Err(UpdateError::Reentrant);
        }
        let number = self.passes.get() + 1;
        self.passes.set(number);
        debug!(pass = number, roots = roots.len(), "update pass started");
        let outcome = pass::run(self, roots);
        self.in_pass.set(false);
        debug!(
            pass = number,
            jobs = outcome.len(),
            failed = outcome.failed(),
            "update pass settled"
        );
        Ok(outcome)
    }

    /// Hand failures to the error handler; with no handler they come back.
    pub(crate) fn report(&self, outcome: &BatchOutcome<BindingError>) -> Result<(), AggregateError> {
        let failures: Vec<(String, BindingError)> = outcome
            .failures()
            .map(|(label, err)| (label.to_string(), err.clone()))
            .collect();
        if failures.is_empty() {
            return Ok(());
        }
        let error = AggregateError {
            failures,
            total: outcome.len(),
        };
        warn!(failed = error.len(), total = error.total, "update jobs failed");
        for (label, err) in &error.failures {
            debug!(job = %label, error = %err, "job failed");
        }
        match self.component.error_handler() {
            Some(handler) => {
                handler(&error);
                Ok(())
            }
            None => Err(error),
        }
    }

    /// Report work that ran outside a caller's stack frame.
    pub(crate) fn report_background(&self, outcome: BatchOutcome<BindingError>) {
        if let Err(error) = self.report(&outcome) {
            let mut slot = self.unhandled.borrow_mut();
            match slot.as_mut() {
                Some(existing) => existing.merge(error),
                None => *slot = Some(error),
            }
        }
    }
}

/// A template engine instance: one component surface, one document.
pub struct Runtime {
    engine: Rc<Engine>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Runtime {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_renderer(config, StubRenderer::new())
    }

    pub fn with_renderer(config: EngineConfig, renderer: impl Renderer + 'static) -> Self {
        Self {
            engine: Engine::new(config, Box::new(renderer)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.engine.config
    }

    pub fn state(&self) -> &State {
        self.engine.component.state()
    }

    /// Set a read-only prop. A changed prop requests an update pass.
    pub fn set_prop(&self, name: impl Into<String>, value: Value) {
        if self.engine.component.set_prop(name, value) {
            self.engine.request_pass();
        }
    }

    pub fn define_method(
        &self,
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, String> + 'static,
    ) {
        self.engine.component.define_method(Callable::new(name, func));
    }

    /// Receive aggregated job failures instead of having them returned.
    pub fn on_error(&self, handler: impl Fn(&AggregateError) + 'static) {
        self.engine.component.set_error_handler(Rc::new(handler));
    }

    /// Allow `data-state:*` on `tag`; `factory` builds each instance's state.
    pub fn register_component(&self, tag: &str, factory: impl Fn() -> State + 'static) {
        self.engine
            .components
            .borrow_mut()
            .insert(tag.to_ascii_lowercase(), Rc::new(factory));
    }

    /// Parse `template` into a detached fragment and map its bindings.
    /// Configuration errors leave nothing behind.
    pub fn compile(&self, template: &str) -> Result<NodeId, ConfigError> {
        let ast = parse_template_to_ast(template)?;
        let (fragment, nodes) = {
            let mut doc = self.engine.doc.borrow_mut();
            let fragment = doc.create_fragment();
            let nodes = instantiate(&ast, &mut doc, fragment)?;
            (fragment, nodes)
        };
        match mapper::map(&self.engine, &nodes, &self.engine.root_scope) {
            Ok(bindings) => {
                debug!(bindings, nodes = nodes.len(), "template compiled");
                Ok(fragment)
            }
            Err(err) => {
                self.engine.discard(fragment)?;
                Err(err)
            }
        }
    }

    /// Map `nodes` against the component scope. Already mapped nodes are
    /// skipped, so mapping twice adds nothing.
    pub fn map(&self, nodes: &[NodeId]) -> Result<usize, ConfigError> {
        mapper::map(&self.engine, nodes, &self.engine.root_scope)
    }

    /// Attach `node` to the document, hand it to the renderer and request
    /// the first pass.
    pub fn mount(&self, node: NodeId) -> Result<RenderTree, UpdateError> {
        {
            let mut doc = self.engine.doc.borrow_mut();
            let root = doc.root();
            doc.append_child(root, node)?;
        }
        let tree = {
            let doc = self.engine.doc.borrow();
            self.engine.renderer.borrow_mut().attach(&doc, node)
        };
        debug!(
            backend = self.engine.renderer.borrow().backend_name(),
            nodes = tree.node_count,
            "mounted"
        );
        self.engine.request_pass();
        Ok(tree)
    }

    /// Remove `node`, releasing every binding, listener, child surface and
    /// pending row beneath it.
    pub fn unmount(&self, node: NodeId) -> Result<(), UpdateError> {
        {
            let doc = self.engine.doc.borrow();
            self.engine.renderer.borrow_mut().detach(&doc, node);
        }
        self.engine.discard(node)?;
        debug!(bindings = self.binding_count(), "unmounted");
        Ok(())
    }

    /// Run one pass now over `roots` (the whole document when empty).
    pub fn update(&self, roots: &[NodeId]) -> Result<BatchOutcome<BindingError>, UpdateError> {
        let roots = if roots.is_empty() {
            vec![self.engine.doc.borrow().root()]
        } else {
            roots.to_vec()
        };
        let outcome = self.engine.run_pass(&roots)?;
        self.engine.report(&outcome).map_err(UpdateError::Unhandled)?;
        Ok(outcome)
    }

    /// Schedule a pass for the next turn, coalescing with pending requests.
    pub fn request_update(&self) {
        self.engine.request_pass();
    }

    /// Run one scheduler turn. Returns the number of tasks run.
    pub fn tick(&self) -> usize {
        self.engine.scheduler.run_turn()
    }

    /// Run scheduler turns until nothing is pending, then surface failures
    /// that no handler received.
    pub fn settle(&self) -> Result<usize, UpdateError> {
        let turns = self
            .engine
            .scheduler
            .run_until_idle(self.engine.config.max_turns)?;
        if let Some(error) = self.take_unhandled() {
            return Err(UpdateError::Unhandled(error));
        }
        Ok(turns)
    }

    pub fn take_unhandled(&self) -> Option<AggregateError> {
        self.engine.unhandled.borrow_mut().take()
    }

    /// Fire `event` on `node` and each ancestor in turn. Returns the number
    /// of handlers run.
    pub fn dispatch(&self, node: NodeId, event: &str, payload: Value) -> Result<usize, UpdateError> {
        let event = event.to_ascii_lowercase();
        let path: Vec<NodeId> = {
            let doc = self.engine.doc.borrow();
            std::iter::successors(Some(node), |&n| doc.parent(n)).collect()
        };
        let mut outcome = BatchOutcome::default();
        let mut fired = 0;
        for n in path {
            let ids = self.engine.events.borrow().handlers(n, &event);
            for id in ids {
                let Some(binding) = self.engine.registry.borrow().get(id) else {
                    continue;
                };
                if let BindingKind::Event(handler) = &binding.kind {
                    fired += 1;
                    trace!(event = %event, handler = %binding.label, "dispatching");
                    outcome.record(&binding.label, handler.fire(&binding, payload.clone()).map(drop));
                }
            }
        }
        self.engine.report(&outcome).map_err(UpdateError::Unhandled)?;
        Ok(fired)
    }

    /// Deliver user input: model bindings on `node` write `value` back to
    /// state, then `input` handlers run.
    pub fn input(&self, node: NodeId, value: Value) -> Result<usize, UpdateError> {
        let bindings = self.engine.registry.borrow().bindings_of(node);
        let mut outcome = BatchOutcome::default();
        for binding in &bindings {
            if let BindingKind::Model(model) = &binding.kind {
                outcome.record(&binding.label, model.write(binding, &self.engine, value.clone()));
            }
        }
        self.engine.report(&outcome).map_err(UpdateError::Unhandled)?;
        self.dispatch(node, "input", value)
    }

    pub fn query_all(&self, selector: &str) -> Result<Vec<NodeId>, DomError> {
        let doc = self.engine.doc.borrow();
        doc.query_all(doc.root(), selector)
    }

    pub fn query(&self, selector: &str) -> Result<Option<NodeId>, DomError> {
        let doc = self.engine.doc.borrow();
        doc.query(doc.root(), selector)
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.engine.doc.borrow()
    }

    pub fn html(&self) -> String {
        let doc = self.engine.doc.borrow();
        doc.to_html(doc.root())
    }

    pub fn render_html(&self, node: NodeId) -> String {
        self.engine.doc.borrow().to_html(node)
    }

    /// State surface of the component instantiated for `node`.
    pub fn child_state(&self, node: NodeId) -> Option<State> {
        self.engine.child_state(node)
    }

    pub fn bindings_on(&self, node: NodeId) -> Vec<Rc<Binding>> {
        self.engine.registry.borrow().bindings_of(node)
    }

    pub fn binding_count(&self) -> usize {
        self.engine.registry.borrow().len()
    }

    pub fn bindings_by_kind(&self) -> BTreeMap<&'static str, usize> {
        self.engine.registry.borrow().count_by_kind()
    }

    /// Update passes run so far, immediate and deferred.
    pub fn passes(&self) -> u64 {
        self.engine.passes.get()
    }

    pub fn pending_tasks(&self) -> usize {
        self.engine.scheduler.pending()
    }

    pub fn backend_name(&self) -> &'static str {
        self.engine.renderer.borrow().backend_name()
    }
}
