// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{session, signals, submission},
    state::AppState,
};

/// Assembles the sidecar router.
///
/// * Session view and student actions under `/api/session`.
/// * Applies global middleware (Trace, CORS for the client shell's origin).
pub fn create_router(state: AppState, shell_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(shell_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let session_routes = Router::new()
        .route("/", get(session::get_session))
        .route("/briefing", post(session::answer_briefing))
        .route("/answers", post(session::select_answer))
        .route("/flags/{question_id}", post(session::toggle_flag))
        .route("/navigate", post(session::navigate))
        .route("/warning/dismiss", post(session::dismiss_warning))
        .route("/signals", post(signals::post_signal))
        .route("/submit", post(submission::submit))
        .route("/retry", post(submission::retry));

    Router::new()
        .nest("/api/session", session_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
