use std::sync::Arc;

use galley_engine::ImportService;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via
/// `State<AppState<S>>`, generic over the import store.
pub struct AppState<S> {
    pub service: Arc<ImportService<S>>,
    pub config: Arc<ServerConfig>,
}

impl<S> AppState<S> {
    pub fn new(service: ImportService<S>, config: ServerConfig) -> Self {
        Self {
            service: Arc::new(service),
            config: Arc::new(config),
        }
    }
}

// Manual impl: cloning the state never needs `S: Clone`.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            config: Arc::clone(&self.config),
        }
    }
}
