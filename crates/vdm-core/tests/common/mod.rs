//! Scripted downloader for engine tests.
//!
//! Each item gets a script (succeed, always fail, fail-then-succeed); the
//! fake reports chunked progress, honors the cancel token per chunk, and
//! records claim counts plus concurrency probes so tests can assert claim
//! exclusivity and the worker-slot cap.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use vdm_core::control::CancelToken;
use vdm_core::downloader::{DownloadError, Downloader};
use vdm_core::item::ItemSpec;
use vdm_core::progress::ProgressReporter;

/// What fetching a given item should do.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Report all chunks, then succeed.
    Succeed,
    /// Fail with a transfer error partway through, on every attempt.
    AlwaysFail,
    /// Fail the first `n` attempts, then succeed.
    FailFirst(u32),
}

pub struct FakeDownloader {
    scripts: HashMap<String, Script>,
    chunks: u64,
    chunk_bytes: u64,
    chunk_delay: Duration,
    /// Fetch invocations per item id (== attempts driven by the pool).
    claims: Mutex<HashMap<String, u32>>,
    /// Claim order across the whole run.
    claim_order: Mutex<Vec<String>>,
    active_now: AtomicUsize,
    max_active: AtomicUsize,
    active_ids: Mutex<HashSet<String>>,
    /// Set if the same item was ever active twice at once.
    overlap_seen: AtomicBool,
}

impl FakeDownloader {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            chunks: 4,
            chunk_bytes: 1024,
            chunk_delay: Duration::from_millis(5),
            claims: Mutex::new(HashMap::new()),
            claim_order: Mutex::new(Vec::new()),
            active_now: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            active_ids: Mutex::new(HashSet::new()),
            overlap_seen: AtomicBool::new(false),
        }
    }

    pub fn with_script(mut self, id: &str, script: Script) -> Self {
        self.scripts.insert(id.to_string(), script);
        self
    }

    pub fn with_chunks(mut self, chunks: u64, delay: Duration) -> Self {
        self.chunks = chunks;
        self.chunk_delay = delay;
        self
    }

    pub fn claims_of(&self, id: &str) -> u32 {
        *self.claims.lock().unwrap().get(id).unwrap_or(&0)
    }

    pub fn claim_order(&self) -> Vec<String> {
        self.claim_order.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn overlap_seen(&self) -> bool {
        self.overlap_seen.load(Ordering::SeqCst)
    }

    fn begin(&self, id: &str) -> u32 {
        let attempt = {
            let mut claims = self.claims.lock().unwrap();
            let count = claims.entry(id.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        self.claim_order.lock().unwrap().push(id.to_string());
        if !self.active_ids.lock().unwrap().insert(id.to_string()) {
            self.overlap_seen.store(true, Ordering::SeqCst);
        }
        let now = self.active_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        attempt
    }

    fn end(&self, id: &str) {
        self.active_ids.lock().unwrap().remove(id);
        self.active_now.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Downloader for FakeDownloader {
    async fn fetch(
        &self,
        item: &ItemSpec,
        progress: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<(), DownloadError> {
        let attempt = self.begin(&item.id);
        let script = self
            .scripts
            .get(&item.id)
            .copied()
            .unwrap_or(Script::Succeed);
        let total = self.chunks * self.chunk_bytes;

        let fail_this_attempt = match script {
            Script::Succeed => false,
            Script::AlwaysFail => true,
            Script::FailFirst(n) => attempt <= n,
        };
        // Failures break off after half the chunks, like a dropped stream.
        let chunks_this_attempt = if fail_this_attempt {
            (self.chunks / 2).max(1)
        } else {
            self.chunks
        };

        for chunk in 1..=chunks_this_attempt {
            tokio::time::sleep(self.chunk_delay).await;
            if cancel.is_cancelled() {
                self.end(&item.id);
                return Err(DownloadError::Cancelled);
            }
            progress.report(chunk * self.chunk_bytes, Some(total));
        }

        self.end(&item.id);
        if fail_this_attempt {
            Err(DownloadError::Transfer("stream reset".to_string()))
        } else {
            Ok(())
        }
    }
}
