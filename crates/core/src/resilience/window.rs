//! Fixed-size ring buffer of recent call outcomes

use crate::resilience::outcome::CallOutcome;

/// The last `capacity` outcomes, with running failure count
///
/// Pushing evicts the oldest entry once full. Counts and failure rate are
/// maintained incrementally, so every operation is O(1).
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    slots: Vec<CallOutcome>,
    capacity: usize,
    next: usize,
    failures: usize,
}

impl SlidingWindow {
    /// Create an empty window; a zero capacity is raised to 1
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { slots: Vec::with_capacity(capacity), capacity, next: 0, failures: 0 }
    }

    /// Append an outcome, evicting the oldest one when full
    pub fn push(&mut self, outcome: CallOutcome) {
        if outcome.is_failure() {
            self.failures += 1;
        }

        if self.slots.len() < self.capacity {
            self.slots.push(outcome);
        } else {
            let evicted = std::mem::replace(&mut self.slots[self.next], outcome);
            if evicted.is_failure() {
                self.failures -= 1;
            }
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Outcomes currently held
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// Failures and timeouts currently held
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Failure percentage in `[0, 100]`; zero when empty
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.failures as f64 * 100.0 / self.slots.len() as f64
    }

    /// Drop every outcome
    pub fn clear(&mut self) {
        self.slots.clear();
        self.next = 0;
        self.failures = 0;
    }
}
