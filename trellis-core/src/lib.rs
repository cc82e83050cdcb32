//! Runtime primitives shared by the trellis crates: values, scopes, reactive
//! state, the cooperative scheduler and settle-all job batches.

pub mod arena;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod scope;
pub mod store;
pub mod value;

pub use arena::{Arena, Handle};
pub use error::SchedulerError;
pub use queue::{BatchOutcome, Job, JobQueue, Settled};
pub use scheduler::{Scheduler, TaskId};
pub use scope::{EmptyNamespace, Namespace, Scope, WriteBack};
pub use store::{BatchGuard, State};
pub use value::{Callable, Value, fingerprint};
