//! Shared application state
//!
//! One explicitly constructed context handed to every request handler; the
//! session manager owns the storage tiers and engine counters.

use std::sync::Arc;

use kato_core::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}
