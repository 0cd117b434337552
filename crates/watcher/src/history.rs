use diffwatch_protocol::ReviewResult;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Last `capacity` results, oldest first.
#[derive(Debug)]
pub struct ReviewHistory {
    entries: Mutex<VecDeque<ReviewResult>>,
    capacity: usize,
}

impl ReviewHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity,
        }
    }

    pub fn push(&self, result: ReviewResult) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(result);
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<ReviewResult> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
