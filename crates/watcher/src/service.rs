use crate::cache::{ReviewCache, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL};
use crate::debounce::{Debouncer, DEFAULT_QUIET_PERIOD};
use crate::filter::ChangeFilter;
use crate::history::ReviewHistory;
use crate::orchestrator::{AbortReason, CycleOutcome, ReviewOrchestrator};
use crate::watcher::ChangeWatcher;
use crate::{Result, WatchError};
use diffwatch_backend::ReviewBackend;
use diffwatch_protocol::{AppConfig, ReviewResult, DEFAULT_REVIEW_PROMPT};
use diffwatch_vcs::VcsAdapter;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 64;
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub quiet_period: Duration,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub history_capacity: usize,
    pub filter: ChangeFilter,
    pub prompt: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_QUIET_PERIOD,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            filter: ChangeFilter::default(),
            prompt: DEFAULT_REVIEW_PROMPT.to_string(),
        }
    }
}

impl WatchConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            quiet_period: Duration::from_millis(config.debounce_ms),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            cache_capacity: config.cache_capacity,
            history_capacity: config.history_capacity,
            filter: ChangeFilter::with_extra_dirs(&config.extra_ignored_dirs),
            prompt: config.effective_prompt().to_string(),
        }
    }
}

/// Everything that exists only while one root is being watched.
struct WatchSession {
    watcher: ChangeWatcher,
    orchestrator: Arc<ReviewOrchestrator>,
}

/// Watches one repository and publishes a [`ReviewResult`] per notifiable
/// review cycle.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use diffwatch_watcher::{ReviewWatcher, WatchConfig};
/// # async fn demo(backend: Arc<dyn diffwatch_backend::ReviewBackend>) -> Result<(), Box<dyn std::error::Error>> {
/// let service = ReviewWatcher::new(
///     Arc::new(diffwatch_vcs::GitCli::new()),
///     backend,
///     WatchConfig::default(),
/// );
/// let mut reviews = service.subscribe();
/// service.start_watching(std::path::Path::new("/path/to/repo"))?;
/// while let Ok(result) = reviews.recv().await {
///     println!("{}", result.review);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ReviewWatcher {
    adapter: Arc<dyn VcsAdapter>,
    backend: Arc<dyn ReviewBackend>,
    config: WatchConfig,
    prompt: RwLock<String>,
    updates: broadcast::Sender<ReviewResult>,
    history: Arc<ReviewHistory>,
    session: Mutex<Option<WatchSession>>,
}

impl std::fmt::Debug for ReviewWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewWatcher")
            .field("config", &self.config)
            .field("root", &self.current_root())
            .finish_non_exhaustive()
    }
}

impl ReviewWatcher {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn VcsAdapter>,
        backend: Arc<dyn ReviewBackend>,
        config: WatchConfig,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            adapter,
            backend,
            prompt: RwLock::new(config.prompt.clone()),
            history: Arc::new(ReviewHistory::new(config.history_capacity)),
            config,
            updates,
            session: Mutex::new(None),
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<WatchSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Installs a watcher on `root`, replacing any previous session. Fails
    /// (leaving nothing installed) when `root` is empty or not a repository.
    ///
    /// Must be called from within a tokio runtime: the debounce timer and
    /// event pump are spawned onto it.
    pub fn start_watching(&self, root: &Path) -> Result<()> {
        if root.as_os_str().is_empty() {
            return Err(WatchError::EmptyRoot);
        }
        if !self.adapter.is_repository(root) {
            return Err(WatchError::NotARepository(root.to_path_buf()));
        }
        self.stop_watching();

        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let orchestrator = Arc::new(
            ReviewOrchestrator::new(
                Some(root.clone()),
                self.adapter.clone(),
                self.backend.clone(),
                ReviewCache::new(self.config.cache_ttl, self.config.cache_capacity),
            )
            .with_prompt(self.prompt())
            .with_updates(self.updates.clone())
            .with_history(self.history.clone()),
        );

        let fire_target = orchestrator.clone();
        let debouncer = Debouncer::spawn(self.config.quiet_period, move |coalesced| {
            debug!("Starting review after {coalesced} coalesced change(s)");
            let orchestrator = fire_target.clone();
            tokio::spawn(async move {
                orchestrator.run_cycle().await;
            });
        });

        let watcher = ChangeWatcher::start(
            &root,
            self.adapter.clone(),
            self.config.filter.clone(),
            debouncer,
        )?;

        *self.lock_session() = Some(WatchSession {
            watcher,
            orchestrator,
        });
        info!("Started watching repository: {}", root.display());
        Ok(())
    }

    /// Tears down the current session, if any. Reviews already running are
    /// left to finish.
    pub fn stop_watching(&self) {
        let session = self.lock_session().take();
        if let Some(session) = session {
            session.watcher.stop();
            info!(
                "Stopped watching repository: {}",
                session.watcher.root().display()
            );
        }
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.lock_session().is_some()
    }

    #[must_use]
    pub fn current_root(&self) -> Option<PathBuf> {
        self.lock_session()
            .as_ref()
            .map(|session| session.watcher.root().to_path_buf())
    }

    /// Results in completion order. Slow receivers may observe `Lagged`.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReviewResult> {
        self.updates.subscribe()
    }

    #[must_use]
    pub fn recent_reviews(&self) -> Vec<ReviewResult> {
        self.history.snapshot()
    }

    #[must_use]
    pub fn prompt(&self) -> String {
        self.prompt
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies to the running session and to future ones.
    pub fn set_prompt(&self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        if let Some(session) = self.lock_session().as_ref() {
            session.orchestrator.set_prompt(prompt.clone());
        }
        *self.prompt.write().unwrap_or_else(PoisonError::into_inner) = prompt;
    }

    /// Runs one cycle on the watched root right away, sharing the session's
    /// cache. Without a session there is no root to review.
    pub async fn review_now(&self) -> CycleOutcome {
        let orchestrator = self
            .lock_session()
            .as_ref()
            .map(|session| session.orchestrator.clone());
        match orchestrator {
            Some(orchestrator) => orchestrator.run_cycle().await,
            None => CycleOutcome::Aborted(AbortReason::NoRootConfigured),
        }
    }
}

impl Drop for ReviewWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn blank_configured_prompt_uses_default() {
        let config = AppConfig {
            review_prompt: String::new(),
            debounce_ms: 750,
            ..AppConfig::default()
        };
        let watch = WatchConfig::from_app_config(&config);
        assert_eq!(watch.prompt, DEFAULT_REVIEW_PROMPT);
        assert_eq!(watch.quiet_period, Duration::from_millis(750));
    }
}
