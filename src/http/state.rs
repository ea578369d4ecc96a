use std::sync::Arc;

use crate::session::SessionRegistry;
use crate::store::TranscriptionStore;

/// Shared application state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    /// Deduplicating entry point for transcription runs
    pub registry: Arc<SessionRegistry>,

    /// Read access to stored transcriptions
    pub store: TranscriptionStore,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, store: TranscriptionStore) -> Self {
        Self { registry, store }
    }
}
