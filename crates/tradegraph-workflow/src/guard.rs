//! Cycle guard
//!
//! A step counter with a hard ceiling, independent of any routing logic. It
//! only trips when the policy or a handler is broken.

use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;

/// Result of a guard check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStatus {
    Ok,
    AbortedRecursionLimit,
}

/// Check a step count against a ceiling
///
/// `step_count` is the number of iterations already executed.
pub fn check(step_count: u64, hard_limit: NonZeroU64) -> GuardStatus {
    if step_count >= hard_limit.get() {
        GuardStatus::AbortedRecursionLimit
    } else {
        GuardStatus::Ok
    }
}

/// Monotonic step counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleGuard {
    steps: u64,
    limit: NonZeroU64,
}

impl CycleGuard {
    pub fn new(limit: NonZeroU64) -> Self {
        Self { steps: 0, limit }
    }

    /// Continue counting from a previous run
    pub fn resume(limit: NonZeroU64, steps: u64) -> Self {
        Self { steps, limit }
    }

    /// Account for one iteration
    ///
    /// Returns [`GuardStatus::AbortedRecursionLimit`] without counting once
    /// `limit` iterations have been allowed.
    pub fn tick(&mut self) -> GuardStatus {
        let status = check(self.steps, self.limit);
        if status == GuardStatus::Ok {
            self.steps += 1;
        }
        status
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn limit(&self) -> NonZeroU64 {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(n: u64) -> NonZeroU64 {
        NonZeroU64::new(n).unwrap()
    }

    #[test]
    fn test_check() {
        assert_eq!(check(0, limit(1)), GuardStatus::Ok);
        assert_eq!(check(1, limit(1)), GuardStatus::AbortedRecursionLimit);
        assert_eq!(check(9, limit(10)), GuardStatus::Ok);
        assert_eq!(check(11, limit(10)), GuardStatus::AbortedRecursionLimit);
    }

    #[test]
    fn test_allows_exactly_limit_ticks() {
        let mut guard = CycleGuard::new(limit(5));
        for _ in 0..5 {
            assert_eq!(guard.tick(), GuardStatus::Ok);
        }
        assert_eq!(guard.steps(), 5);
        assert_eq!(guard.tick(), GuardStatus::AbortedRecursionLimit);
        assert_eq!(guard.steps(), 5);
    }

    #[test]
    fn test_resume_keeps_count() {
        let mut guard = CycleGuard::resume(limit(5), 4);
        assert_eq!(guard.tick(), GuardStatus::Ok);
        assert_eq!(guard.tick(), GuardStatus::AbortedRecursionLimit);
        assert_eq!(guard.limit().get(), 5);
    }
}
