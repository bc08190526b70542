//! Process-wide job registry: create, poll, cancel, and clear jobs.
//!
//! The registry is the only shared mutable structure across jobs; entries
//! are inserted on create and removed only by explicit clearing, so a
//! terminal job stays queryable until the client has seen its final state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::downloader::Downloader;
use crate::item::ItemSpec;
use crate::job::{ItemReport, Job, JobId, JobOptions};
use crate::pool;
use crate::progress::JobSnapshot;
use crate::resolver::{ItemResolver, Reference, ResolutionError};

/// Errors that abort job creation. No partial job is registered on any of
/// these.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("resolution failed: {0}")]
    Resolution(#[from] ResolutionError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("job {0} not found")]
    NotFound(JobId),
}

pub struct Registry {
    downloader: Arc<dyn Downloader>,
    jobs: RwLock<HashMap<JobId, Arc<Job>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self {
            downloader,
            jobs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a job from already-resolved items and start its worker pool.
    /// Must be called from within a tokio runtime.
    pub fn create(&self, items: Vec<ItemSpec>, options: JobOptions) -> Result<JobId, CreateError> {
        if items.is_empty() {
            return Err(CreateError::InvalidArgument(
                "item list is empty".to_string(),
            ));
        }
        if options.concurrency_limit < 1 {
            return Err(CreateError::InvalidArgument(
                "concurrency limit must be at least 1".to_string(),
            ));
        }
        if options.retry.max_attempts < 1 {
            return Err(CreateError::InvalidArgument(
                "retry budget must allow at least one attempt".to_string(),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Arc::new(Job::new(id, items, options));
        self.jobs.write().unwrap().insert(id, Arc::clone(&job));
        tracing::info!(job_id = id, items = job.total_items(), "job created");
        tokio::spawn(pool::run_job(job, Arc::clone(&self.downloader)));
        Ok(id)
    }

    /// Resolve a reference and create a job from the result. Resolution
    /// failure aborts creation synchronously.
    pub async fn create_from(
        &self,
        resolver: &dyn ItemResolver,
        reference: &Reference,
        options: JobOptions,
    ) -> Result<JobId, CreateError> {
        let items = resolver.resolve(reference).await?;
        self.create(items, options)
    }

    /// Current snapshot of one job. Side-effect free; safe to poll at any
    /// rate. Unknown ids are an error, never a zeroed snapshot.
    pub fn get(&self, id: JobId) -> Result<JobSnapshot, QueryError> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .map(|job| job.snapshot())
            .ok_or(QueryError::NotFound(id))
    }

    /// Per-item outcomes for one job, in resolver order.
    pub fn items_report(&self, id: JobId) -> Result<Vec<ItemReport>, QueryError> {
        self.jobs
            .read()
            .unwrap()
            .get(&id)
            .map(|job| job.items_report())
            .ok_or(QueryError::NotFound(id))
    }

    /// Snapshots of all known jobs, oldest first.
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .map(|job| job.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }

    /// Request cancellation of a job. Idempotent: cancelling a terminal job
    /// is a no-op, not an error.
    pub fn cancel(&self, id: JobId) -> Result<(), QueryError> {
        let job = self
            .jobs
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(QueryError::NotFound(id))?;
        if job.cancel() {
            tracing::info!(job_id = id, "job cancelled");
        }
        Ok(())
    }

    /// Drop terminal jobs from the registry; running jobs are kept.
    /// Returns how many entries were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.jobs.write().unwrap();
        let before = jobs.len();
        jobs.retain(|_, job| !job.status().is_terminal());
        before - jobs.len()
    }
}
