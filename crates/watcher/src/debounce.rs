//! Quiet-period debouncing.
//!
//! [`DebounceState`] is the pure single-slot timer: every signal moves the one
//! deadline to `now + quiet`. [`Debouncer`] drives it from a tokio task and
//! calls back once the deadline passes with no newer signal.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct DebounceState {
    quiet: Duration,
    deadline: Option<Instant>,
    pending: usize,
}

impl DebounceState {
    #[must_use]
    pub const fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            deadline: None,
            pending: 0,
        }
    }

    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// Re-arms the timer at `now + quiet`.
    pub fn record(&mut self, now: Instant) {
        self.deadline = Some(now + self.quiet);
        self.pending = self.pending.saturating_add(1);
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[must_use]
    pub const fn pending(&self) -> usize {
        self.pending
    }

    /// Disarms the timer if it is due, returning how many signals it coalesced.
    pub fn take_due(&mut self, now: Instant) -> Option<usize> {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                let coalesced = self.pending;
                self.reset();
                Some(coalesced)
            }
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.deadline = None;
        self.pending = 0;
    }
}

enum DebounceCommand {
    Signal,
    Cancel,
}

type FireCallback = Box<dyn Fn(usize) + Send + Sync + 'static>;

/// Owns the timer task. `signal` may be called from any thread; after
/// `cancel` (or drop) the callback never runs again.
pub struct Debouncer {
    command_tx: mpsc::UnboundedSender<DebounceCommand>,
    cancelled: Arc<AtomicBool>,
    // Held across the cancelled check and the callback, and by `cancel`.
    fire_gate: Arc<Mutex<()>>,
    task: Mutex<Option<JoinHandle<()>>>,
    quiet: Duration,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("quiet", &self.quiet)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Debouncer {
    /// Spawns the timer task on the current tokio runtime.
    pub fn spawn<F>(quiet: Duration, on_fire: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let fire_gate = Arc::new(Mutex::new(()));
        let task = tokio::spawn(run_timer(
            DebounceState::new(quiet),
            command_rx,
            cancelled.clone(),
            fire_gate.clone(),
            Box::new(on_fire),
        ));
        Self {
            command_tx,
            cancelled,
            fire_gate,
            task: Mutex::new(Some(task)),
            quiet,
        }
    }

    #[must_use]
    pub const fn quiet_period(&self) -> Duration {
        self.quiet
    }

    /// (Re)starts the quiet period.
    pub fn signal(&self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.command_tx.send(DebounceCommand::Signal);
    }

    /// Disarms the timer and stops the task. Idempotent. Once this returns the
    /// callback will not start again; a callback already running finishes
    /// first.
    pub fn cancel(&self) {
        let swapped = {
            let _gate = self.fire_gate.lock().unwrap_or_else(PoisonError::into_inner);
            self.cancelled.swap(true, Ordering::SeqCst)
        };
        if swapped {
            return;
        }
        let _ = self.command_tx.send(DebounceCommand::Cancel);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn run_timer(
    mut state: DebounceState,
    mut command_rx: mpsc::UnboundedReceiver<DebounceCommand>,
    cancelled: Arc<AtomicBool>,
    fire_gate: Arc<Mutex<()>>,
    on_fire: FireCallback,
) {
    loop {
        let next_deadline = state.deadline();

        tokio::select! {
            cmd = command_rx.recv() => {
                match cmd {
                    Some(DebounceCommand::Signal) => state.record(Instant::now()),
                    Some(DebounceCommand::Cancel) | None => break,
                }
            }
            () = async {
                if let Some(deadline) = next_deadline {
                    time::sleep_until(deadline).await;
                }
            }, if next_deadline.is_some() => {
                if let Some(coalesced) = state.take_due(Instant::now()) {
                    let _gate = fire_gate.lock().unwrap_or_else(PoisonError::into_inner);
                    if cancelled.load(Ordering::SeqCst) {
                        break;
                    }
                    debug!("Quiet period elapsed after {coalesced} change signal(s)");
                    on_fire(coalesced);
                }
            }
        }
    }
    state.reset();
}
