//! Shared data types for diffwatch.
//!
//! Everything that crosses a crate boundary lives here: the [`ReviewResult`]
//! emitted once per review cycle, the backend [`PerformanceMetrics`], and the
//! persisted [`AppConfig`] record.

mod config;
mod review;

pub use config::{AppConfig, Provider, DEFAULT_REVIEW_PROMPT};
pub use review::{PerformanceMetrics, ReviewResult, ReviewStatus, DUPLICATE_DIFF_MESSAGE};

use std::time::SystemTime;

/// Milliseconds since the Unix epoch, saturating to 0 if the clock is before it.
#[must_use]
pub fn unix_ms(at: SystemTime) -> u64 {
    at.duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .and_then(|dur| u64::try_from(dur.as_millis()).ok())
        .unwrap_or(0)
}

#[must_use]
pub fn current_unix_ms() -> u64 {
    unix_ms(SystemTime::now())
}
