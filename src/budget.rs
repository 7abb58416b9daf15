//! Cooperative time budget shared by the decompression chain and the
//! extraction passes.
//!
//! A [`Deadline`] is checked between units of work (one codec attempt, one
//! extraction pass).  It never interrupts a unit that is already running.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires_at: Option<Instant>,
}

impl Deadline {
    /// A deadline `budget` from now.  `None` never expires.
    pub fn after(budget: Option<Duration>) -> Self {
        Self { expires_at: budget.map(|b| Instant::now() + b) }
    }

    pub fn unbounded() -> Self {
        Self { expires_at: None }
    }

    pub fn expired(&self) -> bool {
        matches!(self.expires_at, Some(t) if Instant::now() >= t)
    }
}

impl Default for Deadline {
    fn default() -> Self { Self::unbounded() }
}
