//! One update pass: walk the tree, run state and condition bindings inline,
//! queue the rest, then settle the queue.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;
use trellis_core::{BatchOutcome, JobQueue, Value};
use trellis_dom::NodeId;

use crate::binding::{Binding, BindingKind, Flow};
use crate::error::BindingError;
use crate::runtime::Engine;

pub(crate) struct Pass {
    queue: JobQueue<BindingError>,
    /// Outcomes of bindings that ran inline rather than as queued jobs.
    immediate: RefCell<BatchOutcome<BindingError>>,
}

impl Pass {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            queue: JobQueue::new(),
            immediate: RefCell::new(BatchOutcome::default()),
        })
    }

    pub(crate) fn record(&self, label: &str, result: Result<(), BindingError>) {
        self.immediate.borrow_mut().record(label, result);
    }

    /// Drain the queue, including jobs queued by jobs, and merge inline
    /// outcomes.
    pub(crate) fn finish(&self) -> BatchOutcome<BindingError> {
        let worked = self.queue.work();
        let mut outcome = self.immediate.take();
        outcome.merge(worked);
        outcome
    }
}

/// Run a pass over `roots` and settle it.
pub(crate) fn run(engine: &Rc<Engine>, roots: &[NodeId]) -> BatchOutcome<BindingError> {
    let pass = Pass::new();
    for &root in roots {
        visit(engine, &pass, root);
    }
    pass.finish()
}

/// Which bindings of a visited node run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    All,
    /// Inside a loop row its loop did not queue: the row's own item is
    /// unchanged, so only bindings reading past their frame run.
    Outside,
}

impl Reach {
    fn runs(self, binding: &Binding) -> bool {
        self == Reach::All || binding.reads_outside_frame()
    }
}

/// Pre-order walk from `start`. Loop rows other than `start` are refreshed
/// by their loop; here they only get their state-dependent bindings run.
pub(crate) fn visit(engine: &Rc<Engine>, pass: &Rc<Pass>, start: NodeId) {
    let mut stack = vec![(start, Reach::All)];
    while let Some((node, reach)) = stack.pop() {
        let reach = if node != start && engine.registry.borrow().is_row_root(node) {
            Reach::Outside
        } else {
            reach
        };
        if visit_node(engine, pass, node, reach) == Flow::Suspend {
            continue;
        }
        let doc = engine.doc.borrow();
        stack.extend(doc.children(node).iter().rev().map(|&child| (child, reach)));
    }
}

fn visit_node(engine: &Rc<Engine>, pass: &Rc<Pass>, node: NodeId, reach: Reach) -> Flow {
    let bindings = engine.registry.borrow().bindings_of(node);
    if bindings.is_empty() {
        return Flow::Continue;
    }

    for binding in bindings
        .iter()
        .filter(|b| matches!(b.kind, BindingKind::State(_)) && reach.runs(b))
    {
        let result = binding.execute(engine, pass).map(drop);
        pass.record(&binding.label, result);
    }

    for binding in bindings.iter().filter(|b| matches!(b.kind, BindingKind::Condition(_))) {
        if !reach.runs(binding) {
            // Not re-evaluated; a hidden node stays hidden with its subtree.
            if binding.last_value() == Some(Value::Bool(false)) {
                return Flow::Suspend;
            }
            continue;
        }
        match binding.execute(engine, pass) {
            Ok(Flow::Continue) => pass.record(&binding.label, Ok(())),
            Ok(Flow::Suspend) => {
                pass.record(&binding.label, Ok(()));
                trace!(node = ?node, "subtree suspended");
                return Flow::Suspend;
            }
            Err(err) => {
                pass.record(&binding.label, Err(err));
                return Flow::Suspend;
            }
        }
    }

    for binding in bindings {
        if matches!(
            binding.kind,
            BindingKind::State(_) | BindingKind::Condition(_) | BindingKind::Event(_)
        ) || !reach.runs(&binding)
        {
            continue;
        }
        let engine = Rc::clone(engine);
        let job_pass = Rc::clone(pass);
        pass.queue.add_job(binding.label.clone(), move || {
            if !binding.is_alive() {
                return Ok(());
            }
            binding.execute(&engine, &job_pass).map(drop)
        });
    }
    Flow::Continue
}

/// Queue a refresh of one loop row.
pub(crate) fn queue_visit(engine: &Rc<Engine>, pass: &Rc<Pass>, row: NodeId) {
    let engine = Rc::clone(engine);
    let job_pass = Rc::clone(pass);
    pass.queue.add_job(format!("row {row:?}"), move || {
        let present = engine.doc.borrow().contains(row);
        if present {
            visit(&engine, &job_pass, row);
        }
        Ok(())
    });
}
