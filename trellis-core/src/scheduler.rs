// trellis-core/src/scheduler.rs

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use tracing::trace;

use crate::error::SchedulerError;

pub type Task = Box<dyn FnOnce()>;

/// Cancellation handle for a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

struct Pending {
    id: TaskId,
    ready: u64,
    task: Task,
}

#[derive(Default)]
struct SchedulerInner {
    turn: u64,
    next_id: u64,
    pending: Vec<Pending>,
    // Tasks that may still run. Cancelling removes the id; a task pulled into
    // the current turn is skipped if its id is gone by the time it is reached.
    live: HashSet<TaskId>,
    running: bool,
}

/// Single-threaded cooperative scheduler.
///
/// Work is deferred to a later *turn*; the host drives turns with
/// [`Scheduler::run_turn`] or [`Scheduler::run_until_idle`]. Tasks deferred
/// while a turn is running land in a later turn, never the current one.
#[derive(Clone, Default)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` on the next turn.
    pub fn defer(&self, task: impl FnOnce() + 'static) -> TaskId {
        self.defer_by(1, task)
    }

    /// Run `task` `turns` turns from now (at least one).
    pub fn defer_by(&self, turns: u64, task: impl FnOnce() + 'static) -> TaskId {
        let mut inner = self.inner.borrow_mut();
        let id = TaskId(inner.next_id);
        inner.next_id += 1;
        let ready = inner.turn + turns.max(1);
        inner.pending.push(Pending {
            id,
            ready,
            task: Box::new(task),
        });
        inner.live.insert(id);
        id
    }

    /// Cancel a task that has not run yet. Returns false if it already ran or
    /// was cancelled before.
    pub fn cancel(&self, id: TaskId) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.live.remove(&id) {
            return false;
        }
        inner.pending.retain(|p| p.id != id);
        trace!(task = ?id, "task cancelled");
        true
    }

    pub fn is_pending(&self, id: TaskId) -> bool {
        self.inner.borrow().live.contains(&id)
    }

    /// Number of tasks waiting for a turn.
    pub fn pending(&self) -> usize {
        self.inner.borrow().live.len()
    }

    pub fn turn(&self) -> u64 {
        self.inner.borrow().turn
    }

    /// Advance one turn and run every task that became ready. Returns the
    /// number of tasks run. Re-entrant calls from inside a task are no-ops.
    pub fn run_turn(&self) -> usize {
        let due = {
            let mut inner = self.inner.borrow_mut();
            if inner.running {
                return 0;
            }
            inner.running = true;
            inner.turn += 1;
            let turn = inner.turn;
            let (mut due, rest): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut inner.pending)
                .into_iter()
                .partition(|p| p.ready <= turn);
            inner.pending = rest;
            due.sort_by_key(|p| (p.ready, p.id));
            due
        };

        let mut ran = 0;
        for Pending { id, task, .. } in due {
            // Run without holding the borrow; the task may defer or cancel.
            let live = self.inner.borrow_mut().live.remove(&id);
            if !live {
                continue;
            }
            task();
            ran += 1;
        }

        self.inner.borrow_mut().running = false;
        ran
    }

    /// Run turns until nothing is pending. Returns the number of turns taken.
    pub fn run_until_idle(&self, max_turns: usize) -> Result<usize, SchedulerError> {
        let mut turns = 0;
        while self.pending() > 0 {
            if turns == max_turns {
                return Err(SchedulerError::Runaway(max_turns));
            }
            self.run_turn();
            turns += 1;
        }
        Ok(turns)
    }
}
