//! `data-for`: keyed rows cloned from a detached stencil and kept in place
//! after an anchor node.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace};
use trellis_core::{Scope, TaskId, Value, fingerprint};
use trellis_dom::{DomError, NodeId};
use trellis_template::{Evaluator, compile_assignable};

use super::{Binding, BindingKind, Directive, Flow};
use crate::config::RowCreation;
use crate::error::{BindingError, ConfigError};
use crate::pass::{self, Pass};
use crate::reconcile::{self, DuplicateKey, Keyed, Plan, Step};
use crate::runtime::Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// `item of list`: one row per array element.
    Of,
    /// `key in object`: one row per object key, sorted.
    In,
}

/// The pieces of a `data-for` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopSpec {
    pub item: String,
    pub iteration: Iteration,
    pub iterable: String,
}

impl LoopSpec {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidLoop {
            expression: text.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = text.trim();
        let (item, rest) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| invalid("expected `item of list` or `key in object`"))?;
        let (keyword, iterable) = rest
            .trim_start()
            .split_once(char::is_whitespace)
            .ok_or_else(|| invalid("expected `item of list` or `key in object`"))?;
        let iteration = match keyword {
            "of" => Iteration::Of,
            "in" => Iteration::In,
            _ => return Err(invalid("expected `of` or `in` after the item name")),
        };
        if !is_identifier(item) {
            return Err(invalid("the item name is not an identifier"));
        }
        let iterable = iterable.trim();
        if iterable.is_empty() {
            return Err(invalid("missing iterable expression"));
        }
        Ok(Self {
            item: item.to_string(),
            iteration,
            iterable: iterable.to_string(),
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

struct Row {
    key: Keyed,
    node: NodeId,
    scope: Scope,
}

#[derive(Default)]
struct LoopSite {
    rows: Vec<Row>,
    /// Deferred row creations not yet run.
    pending: Vec<TaskId>,
    /// Bumped whenever pending work is superseded.
    generation: u64,
    /// Fingerprint of the iterable the rows reflect.
    last_print: Option<String>,
}

pub struct LoopBinding {
    pub item: String,
    pub iteration: Iteration,
    pub(crate) stencil: NodeId,
    key: Evaluator,
    /// `iterable[$index] = $value`, when the iterable is an assignable path.
    writer: Option<Evaluator>,
    site: RefCell<LoopSite>,
}

impl LoopBinding {
    pub(crate) fn new(spec: &LoopSpec, stencil: NodeId, key: Evaluator) -> Self {
        let writer = match spec.iteration {
            Iteration::Of => compile_assignable(
                &format!("{}[$index] = $value", spec.iterable),
                &["$index", "$value"],
            )
            .ok(),
            Iteration::In => None,
        };
        Self {
            item: spec.item.clone(),
            iteration: spec.iteration,
            stencil,
            key,
            writer,
            site: RefCell::new(LoopSite::default()),
        }
    }

    pub fn row_count(&self) -> usize {
        self.site.borrow().rows.len()
    }

    pub fn row_nodes(&self) -> Vec<NodeId> {
        self.site.borrow().rows.iter().map(|r| r.node).collect()
    }

    pub fn pending_rows(&self) -> usize {
        self.site.borrow().pending.len()
    }

    /// Items paired with their key and content fingerprints.
    fn entries(&self, binding: &Binding, value: &Value) -> Result<Vec<(Value, Keyed)>, BindingError> {
        let items: Vec<Value> = match (self.iteration, value) {
            (_, Value::Null) => Vec::new(),
            (Iteration::Of, Value::Array(items)) => items.to_vec(),
            (Iteration::In, Value::Object(map)) => {
                map.keys().map(|k| Value::String(k.clone())).collect()
            }
            (Iteration::In, Value::Array(items)) => (0..items.len()).map(Value::from).collect(),
            (_, other) => {
                return Err(BindingError::NotIterable {
                    expression: binding.expression.clone(),
                    found: other.type_name(),
                });
            }
        };
        items
            .into_iter()
            .map(|item| {
                let key = self.key_of(binding, &item)?;
                let keyed = Keyed::new(key, fingerprint(&item));
                Ok((item, keyed))
            })
            .collect()
    }

    fn key_of(&self, binding: &Binding, item: &Value) -> Result<String, BindingError> {
        let row_scope = binding.scope.with_binding(self.item.clone(), item.clone());
        let key = self
            .key
            .evaluate(&row_scope, &[])
            .map_err(|source| BindingError::Eval {
                expression: self.key.source().to_string(),
                source,
            })?;
        Ok(fingerprint(&key))
    }

    /// Store an item assigned inside the row keyed `row_key` back into the
    /// iterable, at that row's current position.
    fn write_back(&self, binding: &Binding, row_key: &str, item: Value) -> Result<(), BindingError> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let iterable = binding.evaluate()?;
        let Some(items) = iterable.as_array() else {
            return Ok(());
        };
        for (index, current) in items.iter().enumerate() {
            if self.key_of(binding, current)? != row_key {
                continue;
            }
            writer
                .evaluate(&binding.scope, &[Value::from(index), item])
                .map_err(|source| BindingError::Eval {
                    expression: writer.source().to_string(),
                    source,
                })?;
            trace!(key = row_key, index, "row item written back");
            return Ok(());
        }
        Ok(())
    }

    /// The scope a row's bindings evaluate in. Assigning the item name writes
    /// through to the iterable when it is assignable.
    fn row_scope(&self, binding: &Rc<Binding>, item: Value, key: &Keyed) -> Scope {
        if self.writer.is_none() {
            return binding.scope.with_binding(self.item.clone(), item);
        }
        let weak = Rc::downgrade(binding);
        let row_key = key.key.clone();
        binding
            .scope
            .with_linked_binding(self.item.clone(), item, move |value| {
                let Some(binding) = weak.upgrade() else {
                    return Ok(());
                };
                match &binding.kind {
                    BindingKind::Loop(site) => site
                        .write_back(&binding, &row_key, value.clone())
                        .map_err(|err| err.to_string()),
                    _ => Ok(()),
                }
            })
    }

    /// Cancel deferred creations from an earlier evaluation.
    fn supersede(&self, engine: &Engine) {
        let pending = {
            let mut site = self.site.borrow_mut();
            site.generation += 1;
            std::mem::take(&mut site.pending)
        };
        let cancelled = pending
            .into_iter()
            .filter(|&id| engine.scheduler.cancel(id))
            .count();
        if cancelled > 0 {
            debug!(cancelled, "superseded pending rows");
        }
    }

    fn create_row(
        &self,
        engine: &Rc<Engine>,
        binding: &Rc<Binding>,
        item: Value,
        key: Keyed,
    ) -> Result<Row, BindingError> {
        let scope = self.row_scope(binding, item, &key);
        let node = engine.doc.borrow_mut().clone_subtree(self.stencil)?;
        if let Err(source) = engine.map_row(node, &scope) {
            engine.doc.borrow_mut().remove(node)?;
            return Err(BindingError::RowSetup {
                key: key.key,
                source,
            });
        }
        trace!(key = %key.key, "row created");
        Ok(Row { key, node, scope })
    }

    fn apply(
        &self,
        engine: &Rc<Engine>,
        binding: &Rc<Binding>,
        pass: &Rc<Pass>,
        plan: Plan,
        entries: Vec<(Value, Keyed)>,
    ) -> bool {
        let old = std::mem::take(&mut self.site.borrow_mut().rows);
        let removed: HashSet<usize> = plan.removed.iter().copied().collect();
        let mut retained = Vec::with_capacity(old.len());
        for (i, row) in old.into_iter().enumerate() {
            if removed.contains(&i) {
                if let Err(err) = engine.discard(row.node) {
                    pass.record(&binding.label, Err(err.into()));
                }
            } else {
                retained.push(Some(row));
            }
        }

        let mut complete = true;
        let mut rows = Vec::with_capacity(entries.len());
        let mut prev = binding.node;
        for ((item, key), step) in entries.into_iter().zip(plan.steps) {
            let row = match step {
                Step::Keep(at) => retained[at].take(),
                Step::Patch(at) => retained[at].take().map(|mut row| {
                    row.scope.define(self.item.clone(), item);
                    row.key = key;
                    pass::queue_visit(engine, pass, row.node);
                    row
                }),
                Step::Create => match self.create_row(engine, binding, item, key) {
                    Ok(row) => {
                        pass::queue_visit(engine, pass, row.node);
                        Some(row)
                    }
                    Err(err) => {
                        complete = false;
                        pass.record(&binding.label, Err(err));
                        None
                    }
                },
            };
            let Some(row) = row else { continue };
            if let Err(err) = place(engine, prev, row.node) {
                pass.record(&binding.label, Err(err.into()));
            }
            prev = row.node;
            rows.push(row);
        }
        self.site.borrow_mut().rows = rows;
        complete
    }

    fn schedule(
        &self,
        engine: &Rc<Engine>,
        binding: &Rc<Binding>,
        entries: Vec<(Value, Keyed)>,
        per_turn: usize,
    ) {
        let generation = self.site.borrow().generation;
        let count = entries.len();
        let ids: Vec<TaskId> = entries
            .into_iter()
            .enumerate()
            .map(|(i, (item, key))| {
                let turns = (i / per_turn.max(1)) as u64 + 1;
                let weak_engine = Rc::downgrade(engine);
                let weak_binding = Rc::downgrade(binding);
                engine.scheduler.defer_by(turns, move || {
                    let (Some(engine), Some(binding)) = (weak_engine.upgrade(), weak_binding.upgrade())
                    else {
                        return;
                    };
                    if let BindingKind::Loop(site) = &binding.kind {
                        site.create_deferred(&engine, &binding, generation, item, key);
                    }
                })
            })
            .collect();
        debug!(rows = count, per_turn, generation, "row creation deferred");
        self.site.borrow_mut().pending = ids;
    }

    fn create_deferred(
        &self,
        engine: &Rc<Engine>,
        binding: &Rc<Binding>,
        generation: u64,
        item: Value,
        key: Keyed,
    ) {
        {
            let mut site = self.site.borrow_mut();
            if !binding.is_alive() || site.generation != generation {
                return;
            }
            site.pending.retain(|&id| engine.scheduler.is_pending(id));
        }
        let pass = Pass::new();
        match self.create_row(engine, binding, item, key) {
            Ok(row) => {
                let node = row.node;
                let prev = self
                    .site
                    .borrow()
                    .rows
                    .last()
                    .map_or(binding.node, |r| r.node);
                if let Err(err) = place(engine, prev, node) {
                    pass.record(&binding.label, Err(err.into()));
                }
                self.site.borrow_mut().rows.push(row);
                pass::visit(engine, &pass, node);
            }
            Err(err) => {
                // Let the next evaluation retry the rows that failed.
                self.site.borrow_mut().last_print = None;
                pass.record(&binding.label, Err(err));
            }
        }
        engine.report_background(pass.finish());
    }

    /// Tear down every row, pending creation and the stencil.
    pub(crate) fn release(&self, engine: &Rc<Engine>) {
        self.supersede(engine);
        let rows = std::mem::take(&mut self.site.borrow_mut().rows);
        for row in rows {
            if let Err(err) = engine.discard(row.node) {
                debug!(error = %err, "row already gone");
            }
        }
        let mut doc = engine.doc.borrow_mut();
        if doc.contains(self.stencil) {
            if let Err(err) = doc.remove(self.stencil) {
                debug!(error = %err, "stencil removal failed");
            }
        }
    }
}

fn place(engine: &Engine, prev: NodeId, node: NodeId) -> Result<(), DomError> {
    let mut doc = engine.doc.borrow_mut();
    if doc.next_sibling(prev) != Some(node) {
        doc.insert_after(prev, node)?;
    }
    Ok(())
}

impl Directive for LoopBinding {
    fn execute(&self, binding: &Rc<Binding>, engine: &Rc<Engine>, pass: &Rc<Pass>) -> Result<Flow, BindingError> {
        let value = binding.evaluate()?;
        let print = fingerprint(&value);
        if self.site.borrow().last_print.as_deref() == Some(print.as_str()) {
            return Ok(Flow::Continue);
        }

        let entries = self.entries(binding, &value)?;
        let keys: Vec<Keyed> = entries.iter().map(|(_, k)| k.clone()).collect();
        let old: Vec<Keyed> = self.site.borrow().rows.iter().map(|r| r.key.clone()).collect();
        let plan = reconcile::plan(&old, &keys).map_err(|DuplicateKey(key)| BindingError::DuplicateKey {
            expression: binding.expression.clone(),
            key,
        })?;

        self.supersede(engine);
        if let RowCreation::Deferred { per_turn } = engine.config.row_creation {
            if old.is_empty() && !entries.is_empty() {
                self.schedule(engine, binding, entries, per_turn);
                self.site.borrow_mut().last_print = Some(print);
                return Ok(Flow::Continue);
            }
        }

        trace!(
            loop_expr = %binding.expression,
            removed = plan.removed.len(),
            created = plan.creates(),
            patched = plan.patches(),
            kept = plan.keeps(),
            "reconciling rows"
        );
        let complete = self.apply(engine, binding, pass, plan, entries);
        self.site.borrow_mut().last_print = complete.then_some(print);
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_of_and_in_forms() {
        let spec = LoopSpec::parse("todo of todos").unwrap();
        assert_eq!(spec.item, "todo");
        assert_eq!(spec.iteration, Iteration::Of);
        assert_eq!(spec.iterable, "todos");

        let spec = LoopSpec::parse("  key   in  settings.groups ").unwrap();
        assert_eq!(spec.iteration, Iteration::In);
        assert_eq!(spec.iterable, "settings.groups");
    }

    #[test]
    fn rejects_malformed_loops() {
        for bad in ["todos", "x from xs", "1x of xs", "x of   "] {
            assert!(
                matches!(LoopSpec::parse(bad), Err(ConfigError::InvalidLoop { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
