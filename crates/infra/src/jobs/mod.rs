//! Collaborator retry queue.
//!
//! Inventory and fiscal calls happen after the ledger commit. They are queued
//! as jobs so a failing collaborator never undoes or blocks a committed order:
//!
//! - every job carries an idempotency key; enqueueing the same key twice is a no-op
//! - failures are retried with fixed, linear or exponential backoff
//! - after the last attempt (or a permanent rejection) the job is dead-lettered

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle, RunReport};
pub use store::{Enqueued, InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
