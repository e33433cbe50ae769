//! Debounced save scheduling
//!
//! Mutations push the deadline back; the host drives `Table::tick()`, which
//! runs one save once the deadline has passed. Repeated mutations inside the
//! debounce window therefore collapse into a single save.

use chrono::{DateTime, Duration, Utc};

/// Longest representable debounce; anything larger is clamped
const MAX_DEBOUNCE_MS: u64 = (i64::MAX / 1000) as u64;

/// Trailing-edge debounce deadline
#[derive(Debug, Clone)]
pub struct SaveScheduler {
    debounce: Duration,
    deadline: Option<DateTime<Utc>>,
}

impl SaveScheduler {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            debounce: Duration::milliseconds(debounce_ms.min(MAX_DEBOUNCE_MS) as i64),
            deadline: None,
        }
    }

    /// (Re)arms the deadline at `now + debounce`.
    ///
    /// A deadline past the end of representable time is never due.
    pub fn schedule(&mut self, now: DateTime<Utc>) {
        let deadline = now
            .checked_add_signed(self.debounce)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.deadline = Some(deadline);
    }

    /// Returns true and disarms if the deadline has passed
    pub fn take_due(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarms without running
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }
}
