pub mod queue;
pub mod scheduler;
pub mod worker;

pub use queue::{ClaimedJob, Job, JobError, JobKind, JobQueue, MAX_ATTEMPTS};
pub use scheduler::{Scheduler, SchedulerError};
pub use worker::Worker;
