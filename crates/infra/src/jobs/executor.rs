//! Job executor with retry and dead-letter handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How long to sleep when the queue has nothing ready
    pub poll_interval: Duration,
    /// Thread name, also used in logs
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            name: "collaborator-jobs".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Handle to a background executor thread.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<RunReport>>,
}

impl JobExecutorHandle {
    /// Request shutdown and wait for the thread to finish its current job.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Totals processed by the background thread so far.
    pub fn stats(&self) -> RunReport {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}

/// Counts from one or more executor passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub processed: u64,
    pub succeeded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl RunReport {
    fn record(&mut self, status: &JobStatus) {
        self.processed += 1;
        match status {
            JobStatus::Completed => self.succeeded += 1,
            JobStatus::Failed { .. } => self.retried += 1,
            JobStatus::DeadLettered { .. } => self.dead_lettered += 1,
            JobStatus::Pending | JobStatus::Running => {}
        }
    }

    fn merge(&mut self, other: &RunReport) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.dead_lettered += other.dead_lettered;
    }
}

/// Runs queued jobs with registered handlers.
///
/// Handlers are looked up by the job kind's type name, then by a
/// `category.*` pattern, then by `*`.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore> std::fmt::Debug for JobExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Box::new(handler));
    }

    fn get_handler(&self, kind: &JobKind) -> Option<&JobHandler> {
        let type_name = kind.type_name();
        if let Some(h) = self.handlers.get(type_name) {
            return Some(h);
        }

        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if type_name.starts_with(prefix) {
                    return Some(handler);
                }
            }
        }

        self.handlers.get("*")
    }

    /// Run every job that is ready now, including retries whose backoff
    /// elapses while the pass is running. Returns when the queue has
    /// nothing ready.
    pub fn run_due(&self) -> Result<RunReport, JobStoreError> {
        let mut report = RunReport::default();
        while let Some(mut job) = self.store.claim_next()? {
            self.execute(&mut job)?;
            report.record(&job.status);
        }
        Ok(report)
    }

    /// Execute one claimed job and persist its outcome.
    pub fn execute(&self, job: &mut Job) -> Result<(), JobStoreError> {
        let started = Utc::now();
        let result = match self.get_handler(&job.kind) {
            Some(handler) => handler(job),
            None => JobResult::Abandon(format!("no handler for job kind {}", job.kind.type_name())),
        };

        match result {
            JobResult::Success => {
                job.mark_completed(started);
                debug!(job_id = %job.id, kind = job.kind.type_name(), "job completed");
            }
            JobResult::Failure(err) => {
                job.mark_failed(err.clone(), started);
                if !job.status.is_terminal() {
                    warn!(
                        job_id = %job.id,
                        kind = job.kind.type_name(),
                        attempt = job.attempt,
                        error = %err,
                        "collaborator call failed; retry scheduled"
                    );
                }
            }
            JobResult::Abandon(err) => job.mark_abandoned(err, started),
        }

        if let JobStatus::DeadLettered { error: reason, attempts } = &job.status {
            error!(
                job_id = %job.id,
                kind = job.kind.type_name(),
                key = %job.idempotency_key,
                attempts = *attempts,
                error = %reason,
                "job dead-lettered"
            );
            return self.store.dead_letter(job.clone(), reason.clone());
        }
        self.store.update(job)
    }
}

impl<S: JobStore + 'static> JobExecutor<S> {
    /// Run the executor on a background thread until shut down.
    pub fn spawn(self: Arc<Self>, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(RunReport::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || executor_loop(&self, &config, &shutdown_rx, &stats_clone))?;

        Ok(JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: &JobExecutor<S>,
    config: &JobExecutorConfig,
    shutdown_rx: &mpsc::Receiver<()>,
    stats: &Mutex<RunReport>,
) {
    info!(executor = %config.name, "job executor started");
    let started = Instant::now();

    loop {
        match executor.run_due() {
            Ok(report) => {
                if report.processed > 0 {
                    if let Ok(mut s) = stats.lock() {
                        s.merge(&report);
                    }
                }
            }
            Err(e) => error!(executor = %config.name, error = %e, "job pass failed"),
        }

        match shutdown_rx.recv_timeout(config.poll_interval) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }
    }

    info!(
        executor = %config.name,
        uptime_secs = started.elapsed().as_secs(),
        "job executor stopped"
    );
}
