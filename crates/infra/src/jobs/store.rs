//! Job storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use serde::Serialize;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    /// Enqueue a job. A job whose idempotency key was seen before is not
    /// queued again; the id of the existing job is returned instead.
    fn enqueue(&self, job: Job) -> Result<Enqueued, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending or failed job whose backoff has elapsed.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// Jobs in the live queue, oldest first, optionally filtered by status
    /// variant (the variant's fields are ignored).
    fn list(&self, status: Option<&JobStatus>, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job out of the live queue into the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Put a dead-lettered job back in the queue with a fresh attempt budget.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    New(JobId),
    Duplicate(JobId),
}

impl Enqueued {
    pub fn job_id(&self) -> JobId {
        match self {
            Enqueued::New(id) | Enqueued::Duplicate(id) => *id,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

#[derive(Debug, Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    dead_letters: HashMap<JobId, DeadLetterEntry>,
    keys: HashMap<String, JobId>,
}

/// In-memory job store.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn poisoned() -> JobStoreError {
        JobStoreError::Storage("lock poisoned".to_string())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<Enqueued, JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        if let Some(existing) = inner.keys.get(&job.idempotency_key) {
            return Ok(Enqueued::Duplicate(*existing));
        }
        if inner.jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        inner.keys.insert(job.idempotency_key.clone(), id);
        inner.jobs.insert(id, job);
        Ok(Enqueued::New(id))
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        Ok(inner
            .jobs
            .get(&job_id)
            .cloned()
            .or_else(|| inner.dead_letters.get(&job_id).map(|e| e.job.clone())))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        match inner.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let now = Utc::now();

        let next = inner
            .jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready(now)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            inner.jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list(&self, status: Option<&JobStatus>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut result: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| {
                status.is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| (j.created_at, j.id.0));
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;

        if !matches!(job.status, JobStatus::DeadLettered { .. }) {
            job.status = JobStatus::DeadLettered {
                error: reason.clone(),
                attempts: job.attempt,
            };
        }
        job.updated_at = Utc::now();

        inner.jobs.remove(&job.id);
        inner.dead_letters.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut result: Vec<DeadLetterEntry> = inner.dead_letters.values().cloned().collect();
        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut inner = self.inner.write().map_err(|_| Self::poisoned())?;
        let entry = inner
            .dead_letters
            .remove(&job_id)
            .ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();

        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let inner = self.inner.read().map_err(|_| Self::poisoned())?;
        let mut stats = JobStats::default();

        for job in inner.jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += inner.dead_letters.len();

        Ok(stats)
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<Enqueued, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn list(&self, status: Option<&JobStatus>, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}
