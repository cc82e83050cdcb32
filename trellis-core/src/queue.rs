//! Settle-all job batches.

use std::cell::RefCell;
use std::collections::VecDeque;

use tracing::trace;

/// A zero-argument unit of work.
pub type Job<E> = Box<dyn FnOnce() -> Result<(), E>>;

/// Outcome of one job in a batch.
#[derive(Debug)]
pub struct Settled<E> {
    pub label: String,
    pub result: Result<(), E>,
}

/// Per-job outcomes of a batch, in completion order.
#[derive(Debug)]
pub struct BatchOutcome<E> {
    pub settled: Vec<Settled<E>>,
}

impl<E> Default for BatchOutcome<E> {
    fn default() -> Self {
        Self {
            settled: Vec::new(),
        }
    }
}

impl<E> BatchOutcome<E> {
    pub fn record(&mut self, label: impl Into<String>, result: Result<(), E>) {
        self.settled.push(Settled {
            label: label.into(),
            result,
        });
    }

    pub fn merge(&mut self, other: BatchOutcome<E>) {
        self.settled.extend(other.settled);
    }

    pub fn len(&self) -> usize {
        self.settled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.settled.iter().filter(|s| s.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.settled.len() - self.succeeded()
    }

    pub fn is_ok(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &E)> {
        self.settled.iter().filter_map(|s| match &s.result {
            Err(e) => Some((s.label.as_str(), e)),
            Ok(()) => None,
        })
    }
}

/// Ordered job list for one update pass.
///
/// Jobs may add more jobs while the batch is draining; those run in the same
/// batch. A failing job never stops the rest.
pub struct JobQueue<E> {
    jobs: RefCell<VecDeque<(String, Job<E>)>>,
}

impl<E> Default for JobQueue<E> {
    fn default() -> Self {
        Self {
            jobs: RefCell::new(VecDeque::new()),
        }
    }
}

impl<E> JobQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, label: impl Into<String>, job: impl FnOnce() -> Result<(), E> + 'static) {
        self.jobs.borrow_mut().push_back((label.into(), Box::new(job)));
    }

    pub fn has_jobs(&self) -> bool {
        !self.jobs.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.jobs.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_jobs()
    }

    /// Drain and run every job, settling each one.
    pub fn work(&self) -> BatchOutcome<E> {
        let mut outcome = BatchOutcome::default();
        loop {
            let next = self.jobs.borrow_mut().pop_front();
            let Some((label, job)) = next else { break };
            trace!(job = %label, "running job");
            let result = job();
            outcome.record(label, result);
        }
        outcome
    }
}
