//! Retry and backoff policy.
//!
//! Encapsulates error classification (throttling vs. broken transfers vs.
//! permanent local failures) and exponential backoff decisions so the worker
//! pool and configuration share a consistent policy.

mod classify;
mod policy;

pub use classify::classify;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
