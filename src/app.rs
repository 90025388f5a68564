use crate::generation::Generation;
use crate::hub::SessionHub;
use crate::store::Store;
use std::sync::Arc;

/// Shared application state behind every HTTP and WebSocket handler.
pub struct AppState {
    pub store: Arc<Store>,
    pub hub: Arc<SessionHub>,
    pub generation: Generation,
}

impl AppState {
    pub fn new(generation: Generation) -> Self {
        Self {
            store: Arc::new(Store::new()),
            hub: Arc::new(SessionHub::new()),
            generation,
        }
    }
}
