// src/handlers/signals.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

use crate::{
    error::AppError,
    handlers::session::{SessionResponse, session_response},
    models::signal::Signal,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SignalResponse {
    /// The shell must call `preventDefault` on the originating event.
    pub blocked: bool,
    pub recorded: usize,
    pub session: SessionResponse,
}

/// Classifies one browser signal forwarded by the shell.
///
/// Fullscreen changes are mirrored into the reported fullscreen state before
/// the session sees them, so a navigation right after re-entering fullscreen
/// is allowed.
pub async fn post_signal(
    State(state): State<AppState>,
    Json(signal): Json<Signal>,
) -> Result<impl IntoResponse, AppError> {
    if let Signal::FullscreenChange { active } = signal {
        state.fullscreen.report(active);
    }

    let mut session = state.session.lock().await;
    let outcome = session.handle_signal(&signal, Utc::now()).await;

    Ok(Json(SignalResponse {
        blocked: outcome.blocked,
        recorded: outcome.recorded,
        session: session_response(&session, &state.fullscreen),
    }))
}
