#![allow(dead_code)]

use async_trait::async_trait;
use diffwatch_backend::{BackendError, ReviewBackend, ReviewResponse};
use diffwatch_protocol::{PerformanceMetrics, Provider};
use diffwatch_vcs::{VcsAdapter, VcsError};
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn command_failed(command: &str) -> VcsError {
    VcsError::CommandFailed {
        command: command.to_string(),
        code: Some(128),
        stderr: "fatal: simulated failure".to_string(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepoState {
    pub diff: String,
    pub tracked: HashSet<String>,
    pub modified: BTreeSet<String>,
    pub fail_diff: bool,
    pub fail_tracked: bool,
    pub fail_changes: bool,
}

/// In-memory working tree. A directory counts as a repository when it
/// contains `.git`.
#[derive(Debug, Default)]
pub struct FakeRepo {
    state: Mutex<RepoState>,
    pub diff_calls: AtomicUsize,
}

impl FakeRepo {
    pub fn with_change(path: &str, diff: &str) -> Self {
        let repo = Self::default();
        repo.update(|state| {
            state.tracked.insert(path.to_string());
            state.modified.insert(path.to_string());
            state.diff = diff.to_string();
        });
        repo
    }

    pub fn update(&self, f: impl FnOnce(&mut RepoState)) {
        f(&mut self.state.lock().expect("repo state"));
    }

    fn state(&self) -> RepoState {
        self.state.lock().expect("repo state").clone()
    }
}

#[async_trait]
impl VcsAdapter for FakeRepo {
    fn is_repository(&self, path: &Path) -> bool {
        path.join(".git").exists()
    }

    async fn diff(&self, _root: &Path) -> diffwatch_vcs::Result<String> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state.fail_diff {
            return Err(command_failed("diff"));
        }
        Ok(state.diff)
    }

    async fn tracked_files(&self, _root: &Path) -> diffwatch_vcs::Result<HashSet<String>> {
        let state = self.state();
        if state.fail_tracked {
            return Err(command_failed("ls-files"));
        }
        Ok(state.tracked)
    }

    async fn modified_tracked_files(
        &self,
        _root: &Path,
    ) -> diffwatch_vcs::Result<BTreeSet<String>> {
        let state = self.state();
        if state.fail_changes {
            return Err(command_failed("diff --name-only"));
        }
        Ok(state.modified)
    }
}

/// Backend that records calls and answers with a canned reply.
#[derive(Debug)]
pub struct FakeBackend {
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    reply: Mutex<Result<String, String>>,
    delay: Duration,
}

impl FakeBackend {
    pub fn replying(text: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok(text.to_string())),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(body: &str) -> Self {
        let backend = Self::replying("");
        *backend.reply.lock().expect("reply") = Err(body.to_string());
        backend
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReviewBackend for FakeBackend {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    async fn review(&self, prompt: &str, _diff: &str) -> diffwatch_backend::Result<ReviewResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().expect("prompts").push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.reply.lock().expect("reply").clone();
        match reply {
            Ok(text) => Ok(ReviewResponse {
                text,
                metrics: Some(PerformanceMetrics {
                    total_duration_ns: 1_000_000,
                    eval_count: 4,
                    eval_duration_ns: 500_000,
                    ..PerformanceMetrics::default()
                }),
            }),
            Err(body) => Err(BackendError::Status {
                provider: "Ollama",
                status: 500,
                body,
            }),
        }
    }
}
