//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the companion
//! service, the session history store and the configuration.

use crate::{
    config::Config,
    history::{HistoryStore, InMemoryHistory},
};
use companion_core::{service::CompanionService, store::InMemoryStore};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: CompanionService,
    pub history: Arc<dyn HistoryStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// State backed by the in-memory companion store and history.
    pub fn in_memory(config: Config, store: Arc<InMemoryStore>) -> Self {
        Self {
            service: CompanionService::new(store.clone()),
            history: Arc::new(InMemoryHistory::new(store)),
            config: Arc::new(config),
        }
    }
}
