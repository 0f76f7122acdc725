// src/state.rs

use std::sync::Arc;

use crate::{session::timers::SharedSession, utils::fullscreen::ReportedFullscreen};

/// Shared by every handler. The session mutex serializes all mutations.
#[derive(Clone)]
pub struct AppState {
    pub session: SharedSession,
    pub fullscreen: Arc<ReportedFullscreen>,
}
