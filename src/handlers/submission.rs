// src/handlers/submission.rs

use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;

use crate::{
    error::AppError,
    handlers::session::{SessionResponse, session_response},
    models::submission::GradedResult,
    state::AppState,
};

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub result: GradedResult,
    pub session: SessionResponse,
}

/// Manual submission. Rejected with 400 while questions are unanswered.
/// A grading failure answers 502 and leaves the session retryable.
pub async fn submit(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut session = state.session.lock().await;
    let result = session.submit(Utc::now()).await?;

    Ok(Json(SubmissionResponse {
        result,
        session: session_response(&session, &state.fullscreen),
    }))
}

/// Resends the frozen payload of a failed submission.
pub async fn retry(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut session = state.session.lock().await;
    let result = session.retry().await?;

    Ok(Json(SubmissionResponse {
        result,
        session: session_response(&session, &state.fullscreen),
    }))
}
