//! Sliding window of recent call outcomes.
//!
//! A fixed-capacity FIFO of success/failure flags. When full, pushing evicts
//! the oldest outcome. A running failure count keeps
//! [`failure_rate`](OutcomeWindow::failure_rate) O(1).

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutcomeWindow {
    outcomes: VecDeque<bool>,
    capacity: usize,
    failures: usize,
}

impl OutcomeWindow {
    /// A capacity of zero is clamped to `1`.
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { outcomes: VecDeque::with_capacity(capacity), capacity, failures: 0 }
    }

    /// Append an outcome (`true` = success), evicting the oldest when full.
    pub(crate) fn push(&mut self, success: bool) {
        if self.outcomes.len() >= self.capacity {
            if let Some(false) = self.outcomes.pop_front() {
                self.failures -= 1;
            }
        }
        if !success {
            self.failures += 1;
        }
        self.outcomes.push_back(success);
    }

    pub(crate) fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn failures(&self) -> usize {
        self.failures
    }

    /// True when `failures / len >= percent / 100`. An empty window never
    /// reaches a threshold.
    pub(crate) fn failure_rate_reaches(&self, percent: u8) -> bool {
        !self.is_empty() && self.failures * 100 >= usize::from(percent) * self.len()
    }

    /// Failure percentage in `[0, 100]`; `0.0` when empty.
    pub(crate) fn failure_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.failures as f64 * 100.0 / self.len() as f64
    }

    pub(crate) fn clear(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
    }
}
