use std::sync::Arc;

use crate::auth::{HandoffCoordinator, SessionManager};

/// Handlers only see the auth services, never the pool, so every store call
/// goes through a bounded service method and the router runs against
/// in-memory stores in tests.
#[derive(Clone)]
pub struct AppState {
    handoff: Arc<HandoffCoordinator>,
    sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(handoff: Arc<HandoffCoordinator>, sessions: Arc<SessionManager>) -> Self {
        Self { handoff, sessions }
    }

    pub fn handoff(&self) -> Arc<HandoffCoordinator> {
        Arc::clone(&self.handoff)
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }
}
