//! Sliding windows over recent call outcomes
//!
//! This module provides:
//! - `Window`: the capability the circuit breaker needs from a window
//! - `CountWindow`: fixed-capacity ring buffer remembering the last N outcomes

use crate::Outcome;
use std::sync::Arc;

/// Recent-history counter of call outcomes
pub trait Window: Send + std::fmt::Debug {
    /// Record one outcome, evicting the oldest one once the window is full
    fn push(&mut self, outcome: Outcome);

    /// Number of outcomes currently remembered (never above `capacity()`)
    fn total(&self) -> u32;

    /// Maximum number of outcomes remembered
    fn capacity(&self) -> u32;

    /// Failed outcomes currently remembered
    fn fail_count(&self) -> u32;

    /// Slow outcomes currently remembered
    fn slow_count(&self) -> u32;

    /// Percentage of failed outcomes, rounded down.
    ///
    /// Callers must ensure `total() > 0`.
    fn fail_rate(&self) -> u8;

    /// Percentage of slow outcomes, rounded down.
    ///
    /// Callers must ensure `total() > 0`.
    fn slow_rate(&self) -> u8;

    /// Forget every outcome, keeping the capacity
    fn reset(&mut self);
}

/// Builds a fresh window of the given capacity
pub type WindowFactory = Arc<dyn Fn(u32) -> Box<dyn Window> + Send + Sync>;

/// Default factory producing a [`CountWindow`]
pub fn count_window_factory() -> WindowFactory {
    Arc::new(|capacity: u32| -> Box<dyn Window> { Box::new(CountWindow::new(capacity)) })
}

/// Ring buffer of the last `capacity` outcomes with running counts
#[derive(Debug, Clone)]
pub struct CountWindow {
    /// `None` marks a cell that was never written
    cells: Vec<Option<Outcome>>,
    next: usize,
    total: u32,
    fail: u32,
    slow: u32,
}

impl CountWindow {
    /// Create an empty window.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity > 0, "Window capacity must be greater than 0");
        Self {
            cells: vec![None; capacity as usize],
            next: 0,
            total: 0,
            fail: 0,
            slow: 0,
        }
    }

    fn rate(count: u32, total: u32) -> u8 {
        // count <= total, so the quotient is at most 100
        (u64::from(count) * 100 / u64::from(total)) as u8
    }
}

impl Window for CountWindow {
    fn push(&mut self, outcome: Outcome) {
        // Undo whatever the overwritten cell contributed
        match self.cells[self.next] {
            Some(Outcome::Fail) => {
                self.fail -= 1;
                self.total -= 1;
            }
            Some(Outcome::Slow) => {
                self.slow -= 1;
                self.total -= 1;
            }
            Some(Outcome::Success) => self.total -= 1,
            None => {}
        }

        self.total += 1;
        match outcome {
            Outcome::Fail => self.fail += 1,
            Outcome::Slow => self.slow += 1,
            Outcome::Success => {}
        }

        self.cells[self.next] = Some(outcome);
        self.next = (self.next + 1) % self.cells.len();
    }

    fn total(&self) -> u32 {
        self.total
    }

    fn capacity(&self) -> u32 {
        self.cells.len() as u32
    }

    fn fail_count(&self) -> u32 {
        self.fail
    }

    fn slow_count(&self) -> u32 {
        self.slow
    }

    fn fail_rate(&self) -> u8 {
        Self::rate(self.fail, self.total)
    }

    fn slow_rate(&self) -> u8 {
        Self::rate(self.slow, self.total)
    }

    fn reset(&mut self) {
        *self = Self::new(self.capacity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_window_starts_empty() {
        let window = CountWindow::new(5);

        assert_eq!(window.total(), 0);
        assert_eq!(window.capacity(), 5);
        assert_eq!(window.fail_count(), 0);
        assert_eq!(window.slow_count(), 0);
    }

    #[test]
    fn test_count_window_rates() {
        let mut window = CountWindow::new(10);

        window.push(Outcome::Success);
        window.push(Outcome::Fail);
        window.push(Outcome::Slow);

        assert_eq!(window.total(), 3);
        // 1/3 rounds down
        assert_eq!(window.fail_rate(), 33);
        assert_eq!(window.slow_rate(), 33);
    }

    #[test]
    fn test_count_window_overwrites_oldest() {
        let mut window = CountWindow::new(4);

        for _ in 0..4 {
            window.push(Outcome::Fail);
        }
        assert_eq!(window.fail_rate(), 100);

        // Each push now evicts one failure
        window.push(Outcome::Success);
        window.push(Outcome::Slow);

        assert_eq!(window.total(), 4);
        assert_eq!(window.fail_count(), 2);
        assert_eq!(window.slow_count(), 1);
        assert_eq!(window.fail_rate(), 50);
        assert_eq!(window.slow_rate(), 25);
    }

    #[test]
    fn test_count_window_capacity_one() {
        let mut window = CountWindow::new(1);

        window.push(Outcome::Fail);
        assert_eq!(window.fail_rate(), 100);

        window.push(Outcome::Success);
        assert_eq!(window.total(), 1);
        assert_eq!(window.fail_rate(), 0);
    }

    #[test]
    fn test_count_window_reset() {
        let mut window = CountWindow::new(3);

        window.push(Outcome::Fail);
        window.push(Outcome::Slow);
        window.reset();

        assert_eq!(window.total(), 0);
        assert_eq!(window.capacity(), 3);
        assert_eq!(window.fail_count(), 0);
        assert_eq!(window.slow_count(), 0);

        // Cursor restarts too: three pushes fill the window exactly
        window.push(Outcome::Success);
        window.push(Outcome::Success);
        window.push(Outcome::Fail);
        assert_eq!(window.total(), 3);
        assert_eq!(window.fail_rate(), 33);
    }

    #[test]
    fn test_factory_builds_count_window() {
        let factory = count_window_factory();
        let window = factory(7);

        assert_eq!(window.capacity(), 7);
        assert_eq!(window.total(), 0);
    }

    #[test]
    #[should_panic(expected = "Window capacity must be greater than 0")]
    fn test_count_window_zero_capacity() {
        CountWindow::new(0);
    }
}
