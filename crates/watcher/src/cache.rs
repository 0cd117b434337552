use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Time source for the cache, swappable so expiry can be tested without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    inserted_at: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// Recently seen diff fingerprints, bounded by age and by count.
///
/// A miss on a diff that was actually seen (evicted, expired) only costs one
/// extra backend call, so the bounds can be tight.
pub struct ReviewCache {
    state: Mutex<CacheState>,
    ttl: Duration,
    capacity: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ReviewCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReviewCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl Default for ReviewCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL, DEFAULT_CACHE_CAPACITY)
    }
}

impl ReviewCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(ttl: Duration, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True iff an unexpired entry for `fingerprint` exists.
    #[must_use]
    pub fn has_recent(&self, fingerprint: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        self.sweep_expired(&mut state, now);
        state.entries.contains_key(fingerprint)
    }

    /// Inserts `fingerprint` unless present; an existing entry keeps its
    /// first-seen time. Returns whether a new entry was created.
    pub fn add(&self, fingerprint: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        self.sweep_expired(&mut state, now);
        self.insert_locked(&mut state, fingerprint, now)
    }

    /// `has_recent` and `add` under one lock: returns true (and records the
    /// fingerprint) only for the first caller within the retention window.
    pub fn try_claim(&self, fingerprint: &str) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        self.sweep_expired(&mut state, now);
        if state.entries.contains_key(fingerprint) {
            return false;
        }
        self.insert_locked(&mut state, fingerprint, now)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    fn insert_locked(&self, state: &mut CacheState, fingerprint: &str, now: Instant) -> bool {
        if state.entries.contains_key(fingerprint) {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq = state.next_seq.wrapping_add(1);
        state.entries.insert(
            fingerprint.to_string(),
            CacheEntry {
                inserted_at: now,
                seq,
            },
        );
        self.evict_overflow(state);
        true
    }

    fn sweep_expired(&self, state: &mut CacheState, now: Instant) {
        let ttl = self.ttl;
        state
            .entries
            .retain(|_, entry| now.saturating_duration_since(entry.inserted_at) <= ttl);
    }

    fn evict_overflow(&self, state: &mut CacheState) {
        let overflow = state.entries.len().saturating_sub(self.capacity);
        if overflow == 0 {
            return;
        }
        let mut by_age: Vec<(Instant, u64, String)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.inserted_at, entry.seq, key.clone()))
            .collect();
        by_age.sort_unstable();
        for (_, _, key) in by_age.into_iter().take(overflow) {
            state.entries.remove(&key);
        }
    }
}
