//! Worker pool: drains one job's claim queue with a bounded set of workers.
//!
//! Each worker loops claim → fetch → settle. Retry backoff runs on a
//! detached timer task so the worker slot is free for other items during the
//! wait; workers park on the job's notify while retries are outstanding and
//! exit once the job can never yield another claim.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::downloader::Downloader;
use crate::job::{Claim, Job};

/// Park fallback tick: re-check the queue even if a notify permit was
/// consumed by another worker.
const PARK_TICK: Duration = Duration::from_millis(250);

/// Drive `job` to a terminal status. Spawns up to `concurrency_limit`
/// workers (never more than the item count) and returns once all of them
/// have drained.
pub async fn run_job(job: Arc<Job>, downloader: Arc<dyn Downloader>) {
    let slots = job
        .options()
        .concurrency_limit
        .max(1)
        .min(job.total_items());
    tracing::debug!(job_id = job.id(), slots, "starting worker pool");

    let mut workers = JoinSet::new();
    for slot in 0..slots {
        workers.spawn(worker_loop(Arc::clone(&job), Arc::clone(&downloader), slot));
    }
    while workers.join_next().await.is_some() {}

    tracing::info!(job_id = job.id(), status = ?job.status(), "job finished");
}

async fn worker_loop(job: Arc<Job>, downloader: Arc<dyn Downloader>, slot: usize) {
    loop {
        match job.claim_next() {
            Claim::Item(claimed) => {
                tracing::debug!(
                    job_id = job.id(),
                    slot,
                    item = %claimed.spec.id,
                    attempt = claimed.attempt,
                    "item claimed"
                );
                let reporter = job.reporter(claimed.index);
                let result = downloader
                    .fetch(&claimed.spec, &reporter, job.cancel_token())
                    .await;
                match result {
                    Ok(()) => {
                        tracing::debug!(job_id = job.id(), item = %claimed.spec.id, "item completed");
                        job.complete(claimed.index);
                    }
                    Err(err) => {
                        if let Some(delay) = job.record_failure(claimed.index, &err) {
                            tracing::debug!(
                                job_id = job.id(),
                                item = %claimed.spec.id,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "item will retry"
                            );
                            let job = Arc::clone(&job);
                            let index = claimed.index;
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                job.requeue(index);
                            });
                        }
                    }
                }
            }
            Claim::Wait => {
                tokio::select! {
                    _ = job.claim_ready().notified() => {}
                    _ = tokio::time::sleep(PARK_TICK) => {}
                }
            }
            Claim::Drained => break,
        }
    }
}
