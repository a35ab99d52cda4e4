//! Application state for the API server

use crate::{Config, TransferEngine};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clone) and provides
/// access to the transfer engine and configuration.
#[derive(Clone)]
pub struct AppState {
    /// The transfer engine instance
    pub engine: Arc<TransferEngine>,

    /// Configuration (for read access, runtime updates go through the engine)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(engine: Arc<TransferEngine>, config: Arc<Config>) -> Self {
        Self { engine, config }
    }
}
