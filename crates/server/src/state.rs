//! Application state shared across handlers.

use std::sync::Arc;

use imagehoard_core::{ImageStore, Ingestor};

use crate::fetch::Fetcher;

/// Shared application state. The store is held behind the [`ImageStore`]
/// trait so tests can substitute an in-memory implementation.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ImageStore>,
    pub ingestor: Arc<Ingestor>,
    pub fetcher: Fetcher,
}

impl AppState {
    pub fn new(store: Arc<dyn ImageStore>, ingestor: Arc<Ingestor>, fetcher: Fetcher) -> Self {
        Self {
            store,
            ingestor,
            fetcher,
        }
    }
}
