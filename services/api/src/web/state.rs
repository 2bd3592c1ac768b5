//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use classroom_core::{
    authoring::AuthoringService, performance::PerformanceService, ports::SessionStore,
    submission::SubmissionService,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<dyn SessionStore>,
    pub submissions: Arc<SubmissionService>,
    pub authoring: Arc<AuthoringService>,
    pub performance: Arc<PerformanceService>,
}
