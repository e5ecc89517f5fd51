//! Short-term memory
//!
//! The ordered list of events accumulated in a session since the last clear
//! or learn. STM is volatile: it lives only in the session manager and is
//! lost on process restart.

use serde::{Deserialize, Serialize};

use crate::config::StmMode;
use crate::observation::Event;

/// Per-session short-term memory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortTermMemory {
    events: Vec<Event>,
}

impl ShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one canonicalized event. Empty events are discarded.
    pub fn push(&mut self, event: Event) {
        if !event.is_empty() {
            self.events.push(event);
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total symbol count across events
    pub fn symbol_count(&self) -> usize {
        self.events.iter().map(|e| e.len()).sum()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Snapshot the current events (taken under the session lock before
    /// storage I/O so the lock is not held across suspension points)
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.clone()
    }

    /// Apply the post-learn truncation for the given mode.
    ///
    /// `CLEAR` empties the STM. `ROLLING` retains the trailing
    /// `max_pattern_length - 1` events when `max_pattern_length > 0`,
    /// otherwise empties.
    pub fn truncate_after_learn(&mut self, mode: StmMode, max_pattern_length: usize) {
        match mode {
            StmMode::Clear => self.events.clear(),
            StmMode::Rolling => {
                if max_pattern_length == 0 {
                    self.events.clear();
                } else {
                    let keep = max_pattern_length.saturating_sub(1);
                    let start = self.events.len().saturating_sub(keep);
                    self.events.drain(..start);
                }
            }
        }
    }
}
