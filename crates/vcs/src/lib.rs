//! # diffwatch VCS adapter
//!
//! The watcher core only needs five questions answered about a working tree;
//! [`VcsAdapter`] is that seam and [`GitCli`] answers them by shelling out to
//! `git`.
//!
//! Paths in tracked/modified sets are repository-relative with `/` separators,
//! exactly as `git ls-files` prints them.

mod error;
mod git;

pub use error::{Result, VcsError};
pub use git::{GitCli, STAGED_HEADER, UNSTAGED_HEADER};

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

#[async_trait]
pub trait VcsAdapter: Send + Sync {
    /// Cheap structural check; never spawns a process.
    fn is_repository(&self, path: &Path) -> bool;

    /// Combined staged and unstaged diff of tracked files. Empty when clean.
    async fn diff(&self, root: &Path) -> Result<String>;

    async fn tracked_files(&self, root: &Path) -> Result<HashSet<String>>;

    async fn modified_tracked_files(&self, root: &Path) -> Result<BTreeSet<String>>;

    async fn has_tracked_changes(&self, root: &Path) -> Result<bool> {
        Ok(!self.modified_tracked_files(root).await?.is_empty())
    }
}
