//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use engagement_core::ports::{AccessGate, ShareNotifier};
use engagement_core::{Clock, Engine};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
/// Nothing here is specific to one viewer; every request re-reads what it needs
/// from the store.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub notifier: Arc<dyn ShareNotifier>,
    pub gate: Arc<dyn AccessGate>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}
