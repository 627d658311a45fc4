//! Cancellation guard
//!
//! A single flag decides whether the current enroll or authenticate cycle has
//! been cancelled. Writers hold the flag's mutex while they enqueue the
//! request that goes with the change, so a flag change and its request reach
//! the worker in the same order as they were made.

use std::sync::{Mutex, PoisonError};

/// Cancellation flag for the current cycle
#[derive(Debug, Default)]
pub struct CancellationGuard {
    cancelled: Mutex<bool>,
}

impl CancellationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the flag and run `enqueue` while still holding it
    pub fn start_cycle<T>(&self, enqueue: impl FnOnce() -> T) -> T {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = false;
        enqueue()
    }

    /// Set the flag and run `enqueue` while still holding it
    pub fn cancel<T>(&self, enqueue: impl FnOnce() -> T) -> T {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        enqueue()
    }

    /// Whether the current cycle has been cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
