//! # diffwatch watcher
//!
//! Turns filesystem churn in a git working tree into deduplicated code
//! reviews.
//!
//! ## Pipeline
//!
//! ```text
//! notify events
//!     │
//!     ├──> ChangeFilter (.git, temp files, dotfiles, artifact dirs)
//!     │      └─> tracked-file relevance check (fail open)
//!     │
//!     ├──> Debouncer (single-slot quiet period)
//!     │      └─> one trigger per burst
//!     │
//!     └──> ReviewOrchestrator
//!            ├─> diff + fingerprint
//!            ├─> ReviewCache (TTL + capacity dedup)
//!            └─> ReviewBackend ──> ReviewResult (broadcast + history)
//! ```
//!
//! [`ReviewWatcher`] wires the stages together for one repository root.

mod cache;
mod debounce;
mod error;
mod filter;
mod fingerprint;
mod history;
mod orchestrator;
mod service;
mod watcher;

pub use cache::{
    Clock, ManualClock, ReviewCache, SystemClock, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL,
};
pub use debounce::{DebounceState, Debouncer, DEFAULT_QUIET_PERIOD};
pub use error::{Result, WatchError};
pub use filter::{relative_key, ChangeFilter, NoiseKind, DEFAULT_IGNORED_DIRS, TEMP_FILE_SUFFIXES};
pub use fingerprint::{fingerprint, normalize_diff, EMPTY_FINGERPRINT};
pub use history::ReviewHistory;
pub use orchestrator::{AbortReason, CycleOutcome, ReviewOrchestrator};
pub use service::{ReviewWatcher, WatchConfig, DEFAULT_HISTORY_CAPACITY};
pub use watcher::{
    assess_change, requires_rescan, ChangeEvent, ChangeKind, ChangeWatcher, Relevance,
    TrackedSnapshot,
};
