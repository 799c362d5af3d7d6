//! Monotonic deadlines for external tool runs.
//!
//! Deadlines use `quanta` monotonic clocks, so changing the system time or
//! an NTP step cannot stretch or cut short a tool's allowance.

use quanta::Instant;
use std::time::Duration;

/// A point after which a running tool is considered overdue.
///
/// A deadline without a limit never expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    /// Start a deadline now. `None` means unbounded.
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            started_at: Instant::now(),
            limit,
        }
    }

    /// A deadline that never expires.
    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// A deadline `limit` from now.
    pub fn after(limit: Duration) -> Self {
        Self::new(Some(limit))
    }

    /// The configured limit, if any.
    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }

    /// Time since the deadline was started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the limit has been exceeded.
    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| self.elapsed() > limit)
    }

    /// Time left before expiry; `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.limit.map(|limit| limit.saturating_sub(self.elapsed()))
    }
}
