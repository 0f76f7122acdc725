// src/handlers/session.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::AppError,
    session::{QuizSession, SessionView},
    state::AppState,
    utils::fullscreen::ReportedFullscreen,
};

/// Session view plus whether the shell should (re)enter fullscreen.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub view: SessionView,
    pub fullscreen_wanted: bool,
}

pub fn session_response(session: &QuizSession, fullscreen: &ReportedFullscreen) -> SessionResponse {
    SessionResponse {
        view: session.view(Utc::now()),
        fullscreen_wanted: fullscreen.is_wanted(),
    }
}

/// DTO for answering the security briefing.
#[derive(Debug, Deserialize)]
pub struct BriefingRequest {
    pub accept: bool,
}

/// DTO for selecting an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct AnswerRequest {
    pub question_id: i64,
    #[validate(length(min = 1, max = 500))]
    pub option: String,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub index: usize,
}

/// Returns the current session view.
pub async fn get_session(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let session = state.session.lock().await;
    Ok(Json(session_response(&session, &state.fullscreen)))
}

/// Accepts (arms monitoring, asks for fullscreen) or declines the briefing.
pub async fn answer_briefing(
    State(state): State<AppState>,
    Json(req): Json<BriefingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = state.session.lock().await;
    if req.accept {
        session.accept_briefing(Utc::now()).await?;
    } else {
        session.decline_briefing()?;
    }
    Ok(Json(session_response(&session, &state.fullscreen)))
}

pub async fn select_answer(
    State(state): State<AppState>,
    Json(req): Json<AnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let mut session = state.session.lock().await;
    session.answer(req.question_id, &req.option)?;
    Ok(Json(session_response(&session, &state.fullscreen)))
}

pub async fn toggle_flag(
    State(state): State<AppState>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = state.session.lock().await;
    let flagged = session.toggle_flag(question_id)?;
    tracing::debug!("Question {} flagged: {}", question_id, flagged);
    Ok(Json(session_response(&session, &state.fullscreen)))
}

/// Fullscreen-gated navigation. Answers 412 until the shell reports
/// fullscreen engaged.
pub async fn navigate(
    State(state): State<AppState>,
    Json(req): Json<NavigateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let mut session = state.session.lock().await;
    session.navigate(req.index).await?;
    Ok(Json(session_response(&session, &state.fullscreen)))
}

pub async fn dismiss_warning(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let mut session = state.session.lock().await;
    session.dismiss_warning()?;
    Ok(Json(session_response(&session, &state.fullscreen)))
}
