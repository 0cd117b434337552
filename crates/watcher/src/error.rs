use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

/// Precondition failures of `start_watching`. Everything that goes wrong
/// during a review cycle is reported inside a `ReviewResult` instead.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Repository path is empty")]
    EmptyRoot,

    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}
