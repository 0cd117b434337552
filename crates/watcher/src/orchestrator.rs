use crate::cache::ReviewCache;
use crate::fingerprint::{fingerprint, short};
use crate::history::ReviewHistory;
use diffwatch_backend::ReviewBackend;
use diffwatch_protocol::{current_unix_ms, ReviewResult, DEFAULT_REVIEW_PROMPT};
use diffwatch_vcs::VcsAdapter;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Why a cycle ended without a notifiable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NoRootConfigured,
    NoTrackedChanges,
    EmptyDiff,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Aborted(AbortReason),
    Emitted(ReviewResult),
}

impl CycleOutcome {
    #[must_use]
    pub const fn result(&self) -> Option<&ReviewResult> {
        match self {
            Self::Emitted(result) => Some(result),
            Self::Aborted(_) => None,
        }
    }
}

/// Runs one review cycle per trigger: diff, fingerprint, dedup, backend call.
///
/// Owns its [`ReviewCache`]. Emitted results go to the broadcast channel and
/// the history ring when those are attached.
pub struct ReviewOrchestrator {
    root: Option<PathBuf>,
    prompt: RwLock<String>,
    adapter: Arc<dyn VcsAdapter>,
    backend: Arc<dyn ReviewBackend>,
    cache: ReviewCache,
    updates: Option<broadcast::Sender<ReviewResult>>,
    history: Option<Arc<ReviewHistory>>,
}

impl std::fmt::Debug for ReviewOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewOrchestrator")
            .field("root", &self.root)
            .field("provider", &self.backend.provider())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl ReviewOrchestrator {
    #[must_use]
    pub fn new(
        root: Option<PathBuf>,
        adapter: Arc<dyn VcsAdapter>,
        backend: Arc<dyn ReviewBackend>,
        cache: ReviewCache,
    ) -> Self {
        Self {
            root: root.filter(|root| !root.as_os_str().is_empty()),
            prompt: RwLock::new(DEFAULT_REVIEW_PROMPT.to_string()),
            adapter,
            backend,
            cache,
            updates: None,
            history: None,
        }
    }

    #[must_use]
    pub fn with_prompt(self, prompt: impl Into<String>) -> Self {
        self.set_prompt(prompt);
        self
    }

    #[must_use]
    pub fn with_updates(mut self, updates: broadcast::Sender<ReviewResult>) -> Self {
        self.updates = Some(updates);
        self
    }

    #[must_use]
    pub fn with_history(mut self, history: Arc<ReviewHistory>) -> Self {
        self.history = Some(history);
        self
    }

    #[must_use]
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    #[must_use]
    pub const fn cache(&self) -> &ReviewCache {
        &self.cache
    }

    pub fn set_prompt(&self, prompt: impl Into<String>) {
        *self.prompt.write().unwrap_or_else(PoisonError::into_inner) = prompt.into();
    }

    #[must_use]
    pub fn prompt(&self) -> String {
        self.prompt
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// One full cycle. Never fails: adapter and backend errors come back as a
    /// failed [`ReviewResult`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(root) = self.root.as_deref() else {
            debug!("No repository configured; skipping review");
            return CycleOutcome::Aborted(AbortReason::NoRootConfigured);
        };
        let started_at = current_unix_ms();

        match self.adapter.has_tracked_changes(root).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("No tracked file changes detected, skipping review");
                return CycleOutcome::Aborted(AbortReason::NoTrackedChanges);
            }
            Err(err) => {
                error!("Error checking for tracked changes: {err}");
                return self.emit(
                    self.new_result(started_at)
                        .failed(format!("Failed to check tracked changes: {err}")),
                );
            }
        }

        let modified_files = match self.adapter.modified_tracked_files(root).await {
            Ok(files) => files.into_iter().collect::<Vec<_>>(),
            Err(err) => {
                warn!("Could not list modified tracked files: {err}");
                Vec::new()
            }
        };
        if !modified_files.is_empty() {
            info!("Tracked files changed: {}", modified_files.join(", "));
        }

        info!("Changes detected, starting review...");
        let diff = match self.adapter.diff(root).await {
            Ok(diff) => diff,
            Err(err) => {
                error!("Failed to get git diff: {err}");
                let mut result = self.new_result(started_at);
                result.modified_files = modified_files;
                return self.emit(result.failed(format!("Failed to get git diff: {err}")));
            }
        };
        if diff.trim().is_empty() {
            debug!("Diff is empty, skipping review");
            return CycleOutcome::Aborted(AbortReason::EmptyDiff);
        }

        let fp = fingerprint(&diff);
        let mut result = self.new_result(started_at);
        result.diff = diff;
        result.fingerprint = Some(fp.clone());
        result.modified_files = modified_files;

        // Check and insert under one lock so concurrent identical cycles make
        // at most one backend call.
        if !self.cache.try_claim(&fp) {
            info!(
                "Duplicate diff detected (checksum: {}...), skipping review",
                short(&fp)
            );
            return self.emit(result.duplicate());
        }
        debug!(
            "Diff checksum {}... added to cache ({} entries)",
            short(&fp),
            self.cache.size()
        );

        let prompt = self.prompt();
        info!(
            "Sending {} bytes of diff to {}",
            result.diff.len(),
            self.backend.provider()
        );
        let response = self.backend.review(&prompt, &result.diff).await;
        let result = match response {
            Ok(response) => {
                if let Some(metrics) = &response.metrics {
                    info!(
                        "Review completed in {:.2}s ({} prompt tokens, {} output tokens, {:.1} tok/s)",
                        metrics.total_duration_secs(),
                        metrics.prompt_eval_count,
                        metrics.eval_count,
                        metrics.output_tokens_per_sec()
                    );
                } else {
                    info!("Review completed");
                }
                result.completed(response.text, response.metrics)
            }
            Err(err) => {
                error!("Error during review: {err}");
                result.failed(format!("Review failed: {err}"))
            }
        };
        self.emit(result)
    }

    fn new_result(&self, started_at: u64) -> ReviewResult {
        let mut result = ReviewResult::started(started_at);
        result.provider = Some(self.backend.provider());
        result
    }

    fn emit(&self, result: ReviewResult) -> CycleOutcome {
        if let Some(history) = &self.history {
            history.push(result.clone());
        }
        if let Some(updates) = &self.updates {
            // No subscribers is fine.
            let _ = updates.send(result.clone());
        }
        CycleOutcome::Emitted(result)
    }
}
