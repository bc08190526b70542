use std::time::Duration;

/// High-level classification of a per-item failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transfer broke mid-stream (network reset, extractor hiccup).
    Transfer,
    /// The remote asked us to slow down (429, rate-limit messages).
    Throttled,
    /// Local failure that another attempt cannot fix (spawn, disk).
    Permanent,
    /// The fetch was cancelled; retrying would fight the user.
    Cancelled,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry; the item's failure is terminal.
    NoRetry,
    /// Re-enqueue the item after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with an attempt budget and a delay cap.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts per item (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Decide whether an item that just failed its `attempt`-th attempt
    /// (1-based) gets another one, and after how long.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Permanent | ErrorKind::Cancelled => RetryDecision::NoRetry,
            ErrorKind::Transfer | ErrorKind::Throttled => {
                // base * 2^(attempt-1), capped.
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                let raw = self.base_delay.saturating_mul(exp);
                RetryDecision::RetryAfter(raw.min(self.max_delay))
            }
        }
    }
}
