//! Progress tracking: per-item byte counters and job-level snapshots.
//!
//! Each item has one cell, written only by the worker currently holding the
//! item and read by snapshot consumers through atomics, so polling a job's
//! status never blocks a transfer. Rates are instantaneous, computed from the
//! last two accepted samples.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

use crate::job::{JobId, JobStatus};

/// Shared per-item progress state. `total = 0` means "unknown".
#[derive(Debug, Default)]
pub(crate) struct ProgressCell {
    bytes: AtomicU64,
    total: AtomicU64,
    rate_bps: AtomicU64,
}

impl ProgressCell {
    pub(crate) fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Known total in bytes, `None` until the downloader reports one.
    pub(crate) fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        }
    }

    pub(crate) fn rate_bps(&self) -> u64 {
        self.rate_bps.load(Ordering::Relaxed)
    }
}

/// One accepted progress sample; the previous one is kept to compute the
/// instantaneous rate.
#[derive(Debug, Clone, Copy)]
struct Sample {
    bytes: u64,
    at: Instant,
}

/// Write handle for one item's progress, owned by the worker driving it.
/// Byte counts must increase monotonically; non-increasing samples are
/// ignored rather than treated as an error (duplicate or out-of-order
/// callbacks are expected from chunked backends).
pub struct ProgressReporter {
    cell: Arc<ProgressCell>,
    last: Mutex<Option<Sample>>,
}

impl ProgressReporter {
    pub(crate) fn new(cell: Arc<ProgressCell>) -> Self {
        Self {
            cell,
            last: Mutex::new(None),
        }
    }

    /// Record a progress callback: bytes downloaded so far and, when the
    /// backend knows it, the expected total.
    pub fn report(&self, bytes_downloaded: u64, bytes_total: Option<u64>) {
        self.report_at(bytes_downloaded, bytes_total, Instant::now());
    }

    /// Like `report`, with an explicit timestamp (tests drive this directly).
    pub fn report_at(&self, bytes_downloaded: u64, bytes_total: Option<u64>, at: Instant) {
        let prev = self.cell.bytes.load(Ordering::Relaxed);
        if bytes_downloaded <= prev {
            return;
        }
        self.cell.bytes.store(bytes_downloaded, Ordering::Relaxed);
        if let Some(total) = bytes_total {
            self.cell.total.store(total, Ordering::Relaxed);
        }

        let mut last = self.last.lock().unwrap();
        if let Some(sample) = *last {
            let dt = at.saturating_duration_since(sample.at).as_secs_f64();
            if dt > 0.0 {
                let rate = (bytes_downloaded - sample.bytes) as f64 / dt;
                self.cell.rate_bps.store(rate as u64, Ordering::Relaxed);
            }
        }
        *last = Some(Sample {
            bytes: bytes_downloaded,
            at,
        });
    }

    /// Reset for a fresh attempt: the new transfer starts its byte count
    /// from zero, so the monotonic guard must restart with it.
    pub(crate) fn reset(&self) {
        self.cell.bytes.store(0, Ordering::Relaxed);
        self.cell.rate_bps.store(0, Ordering::Relaxed);
        *self.last.lock().unwrap() = None;
    }
}

/// Point-in-time view of a job for polling clients. Derived on demand from
/// the item table and progress cells; never stored as source of truth.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Items waiting for a worker slot, including those between retry attempts.
    pub pending: usize,
    pub active: usize,
    /// Item-count based: totals are frequently unknown up front.
    pub progress_percent: u8,
    /// Sum of the instantaneous rates of all active items.
    pub speed_bps: u64,
    /// Remaining known bytes over aggregate speed; `None` when either is unknown.
    pub eta_secs: Option<u64>,
    /// One human-readable line per occupied worker slot, in item order.
    pub active_descriptions: Vec<String>,
}

/// Item-count completion percentage, rounded; 0 when `total` is 0.
pub(crate) fn percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// "4.2 MB" style, 1024-based units.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// "4.2 MB/s" style.
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec))
}

/// "1m 20s" style; "?" when the ETA is unknown.
pub fn format_eta(eta_secs: Option<u64>) -> String {
    let Some(total) = eta_secs else {
        return "?".to_string();
    };
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
