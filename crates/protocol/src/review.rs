use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{current_unix_ms, Provider};

/// Error text attached to results whose diff was already reviewed recently.
pub const DUPLICATE_DIFF_MESSAGE: &str = "Duplicate diff - review skipped to avoid redundancy";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// The backend produced a review.
    Completed,
    /// The adapter or the backend failed.
    Failed,
    /// The diff matched a recently seen fingerprint; no backend call was made.
    Duplicate,
}

/// Timing and token counters reported by a review backend.
///
/// Durations are nanoseconds, matching what Ollama returns.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq, JsonSchema)]
pub struct PerformanceMetrics {
    #[serde(default)]
    pub total_duration_ns: u64,
    #[serde(default)]
    pub load_duration_ns: u64,
    #[serde(default)]
    pub prompt_eval_count: u64,
    #[serde(default)]
    pub prompt_eval_duration_ns: u64,
    #[serde(default)]
    pub eval_count: u64,
    #[serde(default)]
    pub eval_duration_ns: u64,
}

#[allow(clippy::cast_precision_loss)]
fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / 1_000_000_000.0
}

#[allow(clippy::cast_precision_loss)]
fn per_second(count: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

impl PerformanceMetrics {
    #[must_use]
    pub fn total_duration_secs(&self) -> f64 {
        ns_to_secs(self.total_duration_ns)
    }

    #[must_use]
    pub fn load_duration_secs(&self) -> f64 {
        ns_to_secs(self.load_duration_ns)
    }

    #[must_use]
    pub fn prompt_eval_duration_secs(&self) -> f64 {
        ns_to_secs(self.prompt_eval_duration_ns)
    }

    #[must_use]
    pub fn eval_duration_secs(&self) -> f64 {
        ns_to_secs(self.eval_duration_ns)
    }

    /// Input throughput; 0 when the backend did not report a prompt duration.
    #[must_use]
    pub fn prompt_tokens_per_sec(&self) -> f64 {
        per_second(self.prompt_eval_count, self.prompt_eval_duration_secs())
    }

    /// Output throughput; 0 when the backend did not report an eval duration.
    #[must_use]
    pub fn output_tokens_per_sec(&self) -> f64 {
        per_second(self.eval_count, self.eval_duration_secs())
    }
}

/// Outcome of one notifiable review cycle. Immutable once emitted.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct ReviewResult {
    pub id: String,
    pub timestamp_unix_ms: u64,
    pub status: ReviewStatus,
    pub succeeded: bool,
    #[serde(default)]
    pub diff: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub review: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at_unix_ms: u64,
    pub completed_at_unix_ms: u64,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<PerformanceMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modified_files: Vec<String>,
}

impl ReviewResult {
    /// Starts a result in the `Failed` state with a fresh id; the builder
    /// methods below move it to its terminal state.
    #[must_use]
    pub fn started(started_at_unix_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp_unix_ms: started_at_unix_ms,
            status: ReviewStatus::Failed,
            succeeded: false,
            diff: String::new(),
            fingerprint: None,
            review: String::new(),
            error_message: None,
            started_at_unix_ms,
            completed_at_unix_ms: started_at_unix_ms,
            duration_ms: 0,
            metrics: None,
            provider: None,
            modified_files: Vec::new(),
        }
    }

    #[must_use]
    pub fn completed(mut self, review: String, metrics: Option<PerformanceMetrics>) -> Self {
        self.status = ReviewStatus::Completed;
        self.succeeded = true;
        self.review = review;
        self.metrics = metrics;
        self.error_message = None;
        self.finish()
    }

    #[must_use]
    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.status = ReviewStatus::Failed;
        self.succeeded = false;
        self.error_message = Some(message.into());
        self.finish()
    }

    #[must_use]
    pub fn duplicate(mut self) -> Self {
        self.status = ReviewStatus::Duplicate;
        self.succeeded = false;
        self.error_message = Some(DUPLICATE_DIFF_MESSAGE.to_string());
        self.finish()
    }

    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        self.status == ReviewStatus::Duplicate
    }

    fn finish(mut self) -> Self {
        self.completed_at_unix_ms = current_unix_ms().max(self.started_at_unix_ms);
        self.duration_ms = self.completed_at_unix_ms - self.started_at_unix_ms;
        self
    }
}
