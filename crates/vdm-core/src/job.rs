//! One bulk-download job: the item table, the claim queue, and the status
//! state machine.
//!
//! All claim/complete/fail transitions go through a single mutex so no two
//! workers can hold the same item. Progress bytes live outside the mutex
//! (see `progress`) so status polling never contends with transfers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokio::sync::Notify;

use crate::control::CancelToken;
use crate::downloader::DownloadError;
use crate::item::{Item, ItemSpec, ItemState};
use crate::progress::{percent, JobSnapshot, ProgressCell, ProgressReporter};
use crate::retry::{classify, RetryDecision, RetryPolicy};

/// Job identifier, allocated by the registry.
pub type JobId = u64;

/// Derived job status. `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Per-job execution options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Maximum simultaneously active items (worker slots) for this job.
    pub concurrency_limit: usize,
    /// When true, the first item that exhausts its retries stops the job:
    /// in-flight items finish, nothing new is claimed. When false
    /// (best-effort, the default) every item runs to a terminal state.
    pub fail_fast: bool,
    pub retry: RetryPolicy,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: 3,
            fail_fast: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of a claim attempt (see `Job::claim_next`).
pub(crate) enum Claim {
    /// An item was claimed; the worker owns it until it settles.
    Item(ClaimedItem),
    /// Nothing claimable right now, but items are in flight or awaiting a
    /// retry slot; the worker should park and try again.
    Wait,
    /// No further work will ever be claimable from this job.
    Drained,
}

pub(crate) struct ClaimedItem {
    pub index: usize,
    pub spec: ItemSpec,
    /// 1-based attempt number this claim represents.
    pub attempt: u32,
}

/// Per-item outcome row for the end-of-job report: a failed job still says
/// which items succeeded and which did not.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub id: String,
    pub title: Option<String>,
    pub state: ItemState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

struct Table {
    items: Vec<Item>,
    /// Indexes claimable right now, FIFO. Retries re-enter at the back.
    queue: VecDeque<usize>,
    status: JobStatus,
    /// Set by cancellation or a fail-fast trip; no claims happen after this.
    stop_claims: bool,
    active: usize,
    completed_at: Option<SystemTime>,
}

pub struct Job {
    id: JobId,
    options: JobOptions,
    cancel: CancelToken,
    /// Wakes parked workers when a retry re-enters the queue or the job ends.
    claim_ready: Notify,
    created_at: SystemTime,
    cells: Vec<Arc<ProgressCell>>,
    table: Mutex<Table>,
}

impl Job {
    pub(crate) fn new(id: JobId, specs: Vec<ItemSpec>, options: JobOptions) -> Self {
        let items: Vec<Item> = specs.into_iter().map(Item::new).collect();
        let cells = (0..items.len())
            .map(|_| Arc::new(ProgressCell::default()))
            .collect();
        let queue = (0..items.len()).collect();
        Self {
            id,
            options,
            cancel: CancelToken::new(),
            claim_ready: Notify::new(),
            created_at: SystemTime::now(),
            cells,
            table: Mutex::new(Table {
                items,
                queue,
                status: JobStatus::Queued,
                stop_claims: false,
                active: 0,
                completed_at: None,
            }),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn options(&self) -> &JobOptions {
        &self.options
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.table.lock().unwrap().status
    }

    pub fn total_items(&self) -> usize {
        self.table.lock().unwrap().items.len()
    }

    pub fn completed_at(&self) -> Option<SystemTime> {
        self.table.lock().unwrap().completed_at
    }

    pub(crate) fn claim_ready(&self) -> &Notify {
        &self.claim_ready
    }

    /// Atomically claim the next pending item: earliest queued index, marked
    /// `Active`, attempt count bumped. The first claim moves the job from
    /// `Queued` to `Downloading`.
    pub(crate) fn claim_next(&self) -> Claim {
        let mut t = self.table.lock().unwrap();
        if t.stop_claims {
            return Claim::Drained;
        }
        if let Some(index) = t.queue.pop_front() {
            if t.status == JobStatus::Queued {
                t.status = JobStatus::Downloading;
            }
            t.active += 1;
            let item = &mut t.items[index];
            item.state = ItemState::Active;
            item.attempts += 1;
            let attempt = item.attempts;
            let spec = item.spec.clone();
            return Claim::Item(ClaimedItem {
                index,
                spec,
                attempt,
            });
        }
        let retrying = t
            .items
            .iter()
            .any(|i| i.state == ItemState::Retrying);
        if t.active > 0 || retrying {
            Claim::Wait
        } else {
            Claim::Drained
        }
    }

    /// Progress write handle for a freshly claimed item. Resets the cell so
    /// the new attempt's byte counts start from zero.
    pub(crate) fn reporter(&self, index: usize) -> ProgressReporter {
        let reporter = ProgressReporter::new(Arc::clone(&self.cells[index]));
        reporter.reset();
        reporter
    }

    /// Settle a claimed item as completed and re-derive the job status.
    pub(crate) fn complete(&self, index: usize) {
        let mut t = self.table.lock().unwrap();
        let item = &mut t.items[index];
        item.state = ItemState::Completed;
        item.last_error = None;
        t.active -= 1;
        self.evaluate(&mut t);
        drop(t);
        self.claim_ready.notify_waiters();
    }

    /// Settle a claimed item that failed its current attempt. Returns the
    /// backoff delay when the item gets another attempt; the caller schedules
    /// `requeue` after that delay. Returns `None` when the failure is
    /// terminal for the item.
    pub(crate) fn record_failure(&self, index: usize, err: &DownloadError) -> Option<Duration> {
        let mut t = self.table.lock().unwrap();
        t.active -= 1;

        // A cancelled job's in-flight items settle terminally, never retry.
        let decision = if t.status == JobStatus::Cancelled || err.is_cancelled() {
            RetryDecision::NoRetry
        } else {
            let attempts = t.items[index].attempts;
            self.options.retry.decide(attempts, classify(err))
        };

        let item = &mut t.items[index];
        item.last_error = Some(err.to_string());
        match decision {
            RetryDecision::RetryAfter(delay) => {
                item.state = ItemState::Retrying;
                Some(delay)
            }
            RetryDecision::NoRetry => {
                item.state = ItemState::Failed;
                tracing::warn!(
                    job_id = self.id,
                    item = %item.spec.id,
                    attempts = item.attempts,
                    error = %err,
                    "item failed"
                );
                if self.options.fail_fast && t.status != JobStatus::Cancelled {
                    t.stop_claims = true;
                }
                self.evaluate(&mut t);
                drop(t);
                self.claim_ready.notify_waiters();
                None
            }
        }
    }

    /// Put a `Retrying` item back at the tail of the claim queue. If the job
    /// stopped in the meantime the item parks as `Pending`, reflecting that
    /// it was never re-attempted.
    pub(crate) fn requeue(&self, index: usize) {
        let mut t = self.table.lock().unwrap();
        if t.items[index].state != ItemState::Retrying {
            return;
        }
        t.items[index].state = ItemState::Pending;
        if !t.stop_claims {
            t.queue.push_back(index);
            drop(t);
            self.claim_ready.notify_one();
        }
    }

    /// Request cancellation. Terminal immediately: no new item work is
    /// scheduled, in-flight items are left to settle cooperatively. Returns
    /// false when the job was already terminal (idempotent no-op).
    pub fn cancel(&self) -> bool {
        let mut t = self.table.lock().unwrap();
        if t.status.is_terminal() {
            return false;
        }
        t.status = JobStatus::Cancelled;
        t.completed_at = Some(SystemTime::now());
        t.stop_claims = true;
        drop(t);
        self.cancel.cancel();
        self.claim_ready.notify_waiters();
        true
    }

    /// Re-derive the job status after an item reached a terminal state.
    /// Caller holds the table lock.
    fn evaluate(&self, t: &mut Table) {
        if t.status.is_terminal() || t.active > 0 {
            return;
        }
        let any_failed = t.items.iter().any(|i| i.state == ItemState::Failed);
        if t.stop_claims {
            // Fail-fast trip: pending items stay pending.
            t.status = JobStatus::Failed;
            t.completed_at = Some(SystemTime::now());
            return;
        }
        if t.items.iter().all(|i| i.state.is_terminal()) {
            t.status = if any_failed {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            };
            t.completed_at = Some(SystemTime::now());
        }
    }

    /// Point-in-time progress snapshot. Safe to call at any rate; reads the
    /// item table under its mutex and progress bytes through atomics only.
    pub fn snapshot(&self) -> JobSnapshot {
        let t = self.table.lock().unwrap();
        let total = t.items.len();
        let mut completed = 0;
        let mut failed = 0;
        let mut pending = 0;
        let mut active = 0;
        let mut active_descriptions = Vec::new();
        let mut speed_bps = 0u64;
        let mut remaining_known = 0u64;
        let mut any_known_total = false;

        for (index, item) in t.items.iter().enumerate() {
            match item.state {
                ItemState::Completed => completed += 1,
                ItemState::Failed => failed += 1,
                ItemState::Pending | ItemState::Retrying => pending += 1,
                ItemState::Active => {
                    active += 1;
                    active_descriptions.push(item.spec.label().to_string());
                    speed_bps += self.cells[index].rate_bps();
                }
            }
            if !item.state.is_terminal() {
                if let Some(total_bytes) = self.cells[index].total() {
                    any_known_total = true;
                    remaining_known +=
                        total_bytes.saturating_sub(self.cells[index].bytes());
                }
            }
        }

        let eta_secs = if any_known_total && speed_bps > 0 {
            Some(remaining_known / speed_bps)
        } else {
            None
        };

        JobSnapshot {
            id: self.id,
            status: t.status,
            total,
            completed,
            failed,
            pending,
            active,
            progress_percent: percent(completed, total),
            speed_bps,
            eta_secs,
            active_descriptions,
        }
    }

    /// Per-item outcomes, in resolver order.
    pub fn items_report(&self) -> Vec<ItemReport> {
        let t = self.table.lock().unwrap();
        t.items
            .iter()
            .map(|item| ItemReport {
                id: item.spec.id.clone(),
                title: item.spec.title.clone(),
                state: item.state,
                attempts: item.attempts,
                last_error: item.last_error.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(n: usize) -> Vec<ItemSpec> {
        (0..n)
            .map(|i| ItemSpec::new(format!("vid{i}"), format!("https://example.com/v/{i}")))
            .collect()
    }

    fn claim(job: &Job) -> ClaimedItem {
        match job.claim_next() {
            Claim::Item(c) => c,
            _ => panic!("expected a claimable item"),
        }
    }

    fn transfer_err() -> DownloadError {
        DownloadError::Transfer("connection reset".to_string())
    }

    #[test]
    fn claims_are_fifo_and_bump_attempts() {
        let job = Job::new(1, specs(3), JobOptions::default());
        assert_eq!(job.status(), JobStatus::Queued);
        let a = claim(&job);
        assert_eq!(a.index, 0);
        assert_eq!(a.attempt, 1);
        assert_eq!(job.status(), JobStatus::Downloading);
        let b = claim(&job);
        assert_eq!(b.index, 1);
        // no double-claim of an active item
        let c = claim(&job);
        assert_eq!(c.index, 2);
        assert!(matches!(job.claim_next(), Claim::Wait));
    }

    #[test]
    fn all_completed_makes_job_completed() {
        let job = Job::new(1, specs(2), JobOptions::default());
        let a = claim(&job);
        let b = claim(&job);
        job.complete(a.index);
        assert_eq!(job.status(), JobStatus::Downloading);
        job.complete(b.index);
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.completed_at().is_some());
        assert!(matches!(job.claim_next(), Claim::Drained));
    }

    #[test]
    fn retryable_failure_goes_retrying_then_back_of_queue() {
        let job = Job::new(1, specs(2), JobOptions::default());
        let a = claim(&job);
        let delay = job.record_failure(a.index, &transfer_err());
        assert!(delay.is_some());
        assert_eq!(job.items_report()[0].state, ItemState::Retrying);
        job.requeue(a.index);
        // item 1 was never claimed, so it is still ahead of the retry
        let next = claim(&job);
        assert_eq!(next.index, 1);
        let retried = claim(&job);
        assert_eq!(retried.index, 0);
        assert_eq!(retried.attempt, 2);
    }

    #[test]
    fn exhausted_retries_fail_the_item_permanently() {
        let mut options = JobOptions::default();
        options.retry.max_attempts = 2;
        let job = Job::new(1, specs(1), options);
        let first = claim(&job);
        assert!(job.record_failure(first.index, &transfer_err()).is_some());
        job.requeue(first.index);
        let second = claim(&job);
        assert_eq!(second.attempt, 2);
        assert!(job.record_failure(second.index, &transfer_err()).is_none());
        let report = job.items_report();
        assert_eq!(report[0].state, ItemState::Failed);
        assert_eq!(report[0].attempts, 2);
        assert!(report[0].last_error.is_some());
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn fail_fast_stops_claims_and_fails_once_in_flight_settle() {
        let mut options = JobOptions::default();
        options.fail_fast = true;
        options.retry.max_attempts = 1;
        let job = Job::new(1, specs(4), options);
        let a = claim(&job);
        let b = claim(&job);
        // b exhausts its budget while a is still in flight
        assert!(job.record_failure(b.index, &transfer_err()).is_none());
        assert_eq!(job.status(), JobStatus::Downloading);
        assert!(matches!(job.claim_next(), Claim::Drained));
        job.complete(a.index);
        assert_eq!(job.status(), JobStatus::Failed);
        // untouched items are still pending
        let snap = job.snapshot();
        assert_eq!(snap.pending, 2);
        assert_eq!(snap.completed, 1);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn best_effort_keeps_going_after_a_failure() {
        let mut options = JobOptions::default();
        options.retry.max_attempts = 1;
        let job = Job::new(1, specs(3), options);
        let a = claim(&job);
        assert!(job.record_failure(a.index, &transfer_err()).is_none());
        assert_eq!(job.status(), JobStatus::Downloading);
        let b = claim(&job);
        let c = claim(&job);
        job.complete(b.index);
        job.complete(c.index);
        assert_eq!(job.status(), JobStatus::Failed);
        let snap = job.snapshot();
        assert_eq!(snap.completed, 2);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn cancel_is_terminal_and_idempotent() {
        let job = Job::new(1, specs(3), JobOptions::default());
        let a = claim(&job);
        assert!(job.cancel());
        assert!(!job.cancel());
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(job.cancel_token().is_cancelled());
        assert!(matches!(job.claim_next(), Claim::Drained));
        // the in-flight item settles terminally but the status stays Cancelled
        assert!(job.record_failure(a.index, &DownloadError::Cancelled).is_none());
        assert_eq!(job.status(), JobStatus::Cancelled);
        let snap = job.snapshot();
        assert_eq!(snap.pending, 2);
        assert_eq!(snap.failed, 1);
    }

    #[test]
    fn counts_always_sum_to_total() {
        let mut options = JobOptions::default();
        options.retry.max_attempts = 2;
        let job = Job::new(1, specs(4), options);
        let check = |job: &Job| {
            let s = job.snapshot();
            assert_eq!(s.completed + s.active + s.pending + s.failed, s.total);
        };
        check(&job);
        let a = claim(&job);
        check(&job);
        let b = claim(&job);
        job.complete(a.index);
        check(&job);
        assert!(job.record_failure(b.index, &transfer_err()).is_some());
        check(&job); // Retrying counts as pending
        job.requeue(b.index);
        check(&job);
    }

    #[test]
    fn snapshot_aggregates_speed_and_eta_from_active_items() {
        use std::time::{Duration, Instant};
        let job = Job::new(1, specs(2), JobOptions::default());
        let a = claim(&job);
        let b = claim(&job);
        let t0 = Instant::now();
        let ra = job.reporter(a.index);
        ra.report_at(1, Some(10_000), t0);
        ra.report_at(2_001, Some(10_000), t0 + Duration::from_secs(1));
        let rb = job.reporter(b.index);
        rb.report_at(1, Some(5_000), t0);
        rb.report_at(1_001, Some(5_000), t0 + Duration::from_secs(1));
        let snap = job.snapshot();
        assert_eq!(snap.active, 2);
        assert_eq!(snap.active_descriptions.len(), 2);
        assert_eq!(snap.speed_bps, 3_000);
        // remaining: (10000-2001) + (5000-1001) = 11998; 11998 / 3000 = 3
        assert_eq!(snap.eta_secs, Some(3));
        assert_eq!(snap.progress_percent, 0);
    }

    #[test]
    fn snapshot_eta_unknown_without_totals_or_speed() {
        let job = Job::new(1, specs(1), JobOptions::default());
        let a = claim(&job);
        let _ = a;
        let snap = job.snapshot();
        assert_eq!(snap.speed_bps, 0);
        assert_eq!(snap.eta_secs, None);
    }
}
