use crate::debounce::Debouncer;
use crate::filter::{relative_key, ChangeFilter, NoiseKind};
use crate::{Result, WatchError};
use diffwatch_vcs::VcsAdapter;
use log::{debug, info, warn};
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub observed_at: Instant,
}

impl ChangeEvent {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Instant::now(),
        }
    }

    /// Splits a notify event into one change per path. Access and
    /// metadata-only notifications carry no content change and yield nothing;
    /// events of unknown kind count as modifications.
    #[must_use]
    pub fn from_notify(event: Event) -> Vec<Self> {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Deleted,
            EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Renamed,
            EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
            EventKind::Modify(_) | EventKind::Any => ChangeKind::Modified,
            EventKind::Access(_) | EventKind::Other => return Vec::new(),
        };
        let observed_at = Instant::now();
        event
            .paths
            .into_iter()
            .map(|path| Self {
                path,
                kind,
                observed_at,
            })
            .collect()
    }
}

/// Whether a notify result means events may have been lost, so the tree has
/// to be reviewed without knowing which paths changed: watcher errors, queue
/// overflows and other rescan requests.
#[must_use]
pub fn requires_rescan(event: &notify::Result<Event>) -> bool {
    match event {
        Err(_) => true,
        Ok(event) => event.need_rescan() || matches!(event.kind, EventKind::Other),
    }
}

/// Verdict for one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relevance {
    Noise(NoiseKind),
    /// The path is in the tracked-file set.
    Tracked,
    /// The path itself did not match, but the tree has tracked changes.
    TrackedChangesPresent,
    /// The tracked-file query failed; treated as relevant.
    FailOpen,
    Untracked,
}

impl Relevance {
    #[must_use]
    pub const fn is_relevant(self) -> bool {
        matches!(
            self,
            Self::Tracked | Self::TrackedChangesPresent | Self::FailOpen
        )
    }
}

/// Tracked-file set reused across one burst of events so a multi-file save
/// runs `git ls-files` once, not once per file.
#[derive(Debug, Default)]
pub struct TrackedSnapshot {
    files: Option<(HashSet<String>, Instant)>,
}

impl TrackedSnapshot {
    async fn get(
        &mut self,
        adapter: &dyn VcsAdapter,
        root: &Path,
        max_age: Duration,
    ) -> diffwatch_vcs::Result<&HashSet<String>> {
        let entry = match self.files.take() {
            Some(entry) if entry.1.elapsed() < max_age => entry,
            _ => (adapter.tracked_files(root).await?, Instant::now()),
        };
        Ok(&self.files.insert(entry).0)
    }

    pub fn invalidate(&mut self) {
        self.files = None;
    }
}

/// Decides whether `event` should (re)start the quiet period.
pub async fn assess_change(
    adapter: &dyn VcsAdapter,
    filter: &ChangeFilter,
    root: &Path,
    event: &ChangeEvent,
    snapshot: &mut TrackedSnapshot,
    snapshot_max_age: Duration,
) -> Relevance {
    if let Some(noise) = filter.classify(root, &event.path) {
        return Relevance::Noise(noise);
    }

    let key = relative_key(root, &event.path);
    match snapshot.get(adapter, root, snapshot_max_age).await {
        Ok(tracked) => {
            if key.as_ref().is_some_and(|key| tracked.contains(key)) {
                return Relevance::Tracked;
            }
        }
        Err(err) => {
            snapshot.invalidate();
            warn!("Error checking if file is tracked: {err}");
            return Relevance::FailOpen;
        }
    }

    // Covers tracked paths whose spelling differs from `git ls-files`
    // (case, separators, symlinked roots).
    match adapter.has_tracked_changes(root).await {
        Ok(true) => Relevance::TrackedChangesPresent,
        Ok(false) => Relevance::Untracked,
        Err(err) => {
            warn!("Error checking for tracked changes: {err}");
            Relevance::FailOpen
        }
    }
}

/// Recursive filesystem subscription feeding a [`Debouncer`].
///
/// Owns the OS watch handle, the event pump task and the debouncer; `stop`
/// (or drop) releases all three.
pub struct ChangeWatcher {
    root: PathBuf,
    watcher: Mutex<Option<RecommendedWatcher>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    debouncer: Arc<Debouncer>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("root", &self.root)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl ChangeWatcher {
    /// Subscribes to `root` recursively. Must be called inside a tokio runtime.
    pub fn start(
        root: &Path,
        adapter: Arc<dyn VcsAdapter>,
        filter: ChangeFilter,
        debouncer: Debouncer,
    ) -> Result<Self> {
        let root = root.to_path_buf();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watcher = create_fs_watcher(&root, event_tx)?;
        let debouncer = Arc::new(debouncer);

        let pump = tokio::spawn(run_event_pump(
            root.clone(),
            adapter,
            filter,
            debouncer.clone(),
            event_rx,
        ));

        info!("File watcher started for repository: {}", root.display());
        Ok(Self {
            root,
            watcher: Mutex::new(Some(watcher)),
            pump: Mutex::new(Some(pump)),
            debouncer,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Unsubscribes, disarms the debouncer and stops the pump. Idempotent.
    pub fn stop(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.debouncer.cancel();
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        if watcher.is_some() {
            drop(watcher);
            info!("File watcher stopped for {}", self.root.display());
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn create_fs_watcher(
    root: &Path,
    sender: mpsc::Sender<notify::Result<Event>>,
) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = sender.blocking_send(res);
        },
        notify::Config::default(),
    )
    .map_err(WatchError::Notify)?;
    watcher
        .watch(root, RecursiveMode::Recursive)
        .map_err(WatchError::Notify)?;
    Ok(watcher)
}

async fn run_event_pump(
    root: PathBuf,
    adapter: Arc<dyn VcsAdapter>,
    filter: ChangeFilter,
    debouncer: Arc<Debouncer>,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
) {
    let mut snapshot = TrackedSnapshot::default();
    let snapshot_max_age = debouncer.quiet_period();

    while let Some(event) = event_rx.recv().await {
        if requires_rescan(&event) {
            match &event {
                Err(err) => warn!("Watcher error, re-checking the tree: {err}"),
                Ok(event) => warn!("Watcher requested a rescan ({:?})", event.kind),
            }
            snapshot.invalidate();
            debouncer.signal();
            continue;
        }
        let Ok(event) = event else {
            continue;
        };

        for change in ChangeEvent::from_notify(event) {
            let relevance = assess_change(
                adapter.as_ref(),
                &filter,
                &root,
                &change,
                &mut snapshot,
                snapshot_max_age,
            )
            .await;
            let shown = relative_key(&root, &change.path)
                .unwrap_or_else(|| change.path.display().to_string());
            match relevance {
                Relevance::Noise(kind) => {
                    debug!("Ignoring {:?} ({kind:?}): {shown}", change.kind);
                }
                Relevance::Untracked => {
                    debug!("Untracked file change ignored: {:?} - {shown}", change.kind);
                }
                relevant => {
                    debug!(
                        "Tracked file change detected: {:?} - {shown} ({relevant:?})",
                        change.kind
                    );
                    debouncer.signal();
                    // One relevant path is enough to re-arm for this event.
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode};
    use pretty_assertions::assert_eq;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn notify_kinds_map_to_change_kinds() {
        let cases = [
            (EventKind::Create(CreateKind::File), ChangeKind::Created),
            (EventKind::Remove(RemoveKind::File), ChangeKind::Deleted),
            (
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                ChangeKind::Modified,
            ),
            (
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                ChangeKind::Renamed,
            ),
        ];
        for (kind, expected) in cases {
            let changes = ChangeEvent::from_notify(event(kind, "/r/a.rs"));
            assert_eq!(changes.len(), 1);
            assert_eq!(changes[0].kind, expected);
        }
    }

    #[test]
    fn access_and_metadata_events_are_dropped() {
        assert!(ChangeEvent::from_notify(event(
            EventKind::Access(AccessKind::Any),
            "/r/a.rs"
        ))
        .is_empty());
        assert!(ChangeEvent::from_notify(event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
            "/r/a.rs"
        ))
        .is_empty());
    }

    #[test]
    fn lost_events_force_a_rescan() {
        use notify::event::Flag;

        assert!(requires_rescan(&Err(notify::Error::generic("queue overflow"))));
        assert!(requires_rescan(&Ok(Event::new(EventKind::Other))));
        assert!(requires_rescan(&Ok(
            Event::new(EventKind::Any).set_flag(Flag::Rescan)
        )));
        assert!(!requires_rescan(&Ok(event(
            EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            "/r/a.rs"
        ))));
    }

    #[test]
    fn unknown_kind_counts_as_modification() {
        let changes = ChangeEvent::from_notify(event(EventKind::Any, "/r/a.rs"));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn rename_event_yields_both_paths() {
        let evt = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/r/old.rs"))
            .add_path(PathBuf::from("/r/new.rs"));
        let changes = ChangeEvent::from_notify(evt);
        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::Renamed));
    }

    #[test]
    fn relevance_flags() {
        assert!(Relevance::Tracked.is_relevant());
        assert!(Relevance::TrackedChangesPresent.is_relevant());
        assert!(Relevance::FailOpen.is_relevant());
        assert!(!Relevance::Untracked.is_relevant());
        assert!(!Relevance::Noise(NoiseKind::TempFile).is_relevant());
    }
}
