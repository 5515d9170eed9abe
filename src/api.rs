//! HTTP API for the EcoloBot chat widget

mod handlers;
mod types;

pub use handlers::create_router;

use crate::session::SessionStore;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
}

impl AppState {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }
}
