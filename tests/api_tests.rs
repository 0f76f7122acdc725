// tests/api_tests.rs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use quiz_session::{
    QuizSession,
    config::SecurityPolicy,
    error::AppError,
    routes,
    session::store::MemoryStore,
    state::AppState,
    utils::{
        fullscreen::ReportedFullscreen,
        grading::{GradingService, HttpGradingClient},
    },
};
use serde_json::{Value, json};
use url::Url;

const TEST_TOKEN: &str = "test-token";

/// In-process stand-in for the grading service.
#[derive(Clone)]
struct GraderStub {
    attempt_id: String,
    expires_at: DateTime<Utc>,
    submissions: Arc<Mutex<Vec<Value>>>,
}

impl GraderStub {
    fn submissions(&self) -> Vec<Value> {
        self.submissions.lock().unwrap().clone()
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
        == Some(format!("Bearer {}", TEST_TOKEN).as_str())
}

async fn stub_fetch(
    State(stub): State<GraderStub>,
    Path(attempt_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing credential").into_response();
    }
    if attempt_id != stub.attempt_id {
        return (StatusCode::NOT_FOUND, "no such attempt").into_response();
    }

    Json(json!({
        "attempt_id": stub.attempt_id,
        "expires_at": stub.expires_at,
        "questions": [
            { "id": 1, "content": "Which layer routes packets?", "options": ["Network", "Session"] },
            { "id": 2, "content": "Which layer frames bits?", "options": ["Link", "Transport"] },
            { "id": 3, "content": "Which layer owns ports?", "options": ["Transport", "Physical"] }
        ]
    }))
    .into_response()
}

async fn stub_submit(
    State(stub): State<GraderStub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing credential").into_response();
    }

    let answered = body["answers"].as_object().map_or(0, |a| a.len()) as f64;
    stub.submissions.lock().unwrap().push(body);

    Json(json!({
        "score": answered,
        "max_score": 3.0,
        "percentage": answered / 3.0 * 100.0,
        "passed": answered >= 2.0
    }))
    .into_response()
}

/// Spawns the grading stub on a random port. Returns its base URL.
async fn spawn_grader(attempt_id: &str) -> (Url, GraderStub) {
    let stub = GraderStub {
        attempt_id: attempt_id.to_string(),
        expires_at: Utc::now() + chrono::Duration::minutes(30),
        submissions: Arc::new(Mutex::new(Vec::new())),
    };

    let app = Router::new()
        .route("/api/quiz/attempts/{attempt_id}", get(stub_fetch))
        .route("/api/quiz/attempts/{attempt_id}/submit", post(stub_submit))
        .with_state(stub.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let url = Url::parse(&format!("http://127.0.0.1:{}/", port)).unwrap();
    (url, stub)
}

struct TestApp {
    address: String,
    grader: GraderStub,
    client: reqwest::Client,
}

impl TestApp {
    async fn get_session(&self) -> Value {
        self.client
            .get(format!("{}/api/session", self.address))
            .send()
            .await
            .expect("Failed to execute request")
            .json()
            .await
            .unwrap()
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/session{}", self.address, path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn signal(&self, signal: Value) -> Value {
        let response = self.post("/signals", signal).await;
        assert_eq!(response.status().as_u16(), 200);
        response.json().await.unwrap()
    }
}

/// Spawns the sidecar for `load_id` against a grader serving `served_id`.
async fn spawn_app_for(served_id: &str, load_id: &str) -> TestApp {
    let (grader_url, grader) = spawn_grader(served_id).await;

    let grading = Arc::new(
        HttpGradingClient::new(grader_url, TEST_TOKEN.to_string(), Duration::from_secs(5))
            .expect("Failed to build grading client"),
    );
    let fullscreen = Arc::new(ReportedFullscreen::new());

    let mut session = QuizSession::new(
        Box::new(MemoryStore::new()),
        grading,
        fullscreen.clone(),
        SecurityPolicy::default(),
    );
    // Load errors are rendered through the session view.
    let _ = session.load(Some(load_id), Utc::now()).await;

    let state = AppState {
        session: Arc::new(tokio::sync::Mutex::new(session)),
        fullscreen,
    };
    let app = routes::create_router(state, HeaderValue::from_static("http://localhost:3000"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        grader,
        client: reqwest::Client::new(),
    }
}

async fn spawn_app() -> TestApp {
    let attempt_id = format!("att-{}", uuid::Uuid::new_v4());
    spawn_app_for(&attempt_id, &attempt_id).await
}

/// Accepts the briefing and reports fullscreen engaged.
async fn begin(app: &TestApp) {
    let response = app.post("/briefing", json!({ "accept": true })).await;
    assert_eq!(response.status().as_u16(), 200);
    app.signal(json!({ "type": "fullscreenchange", "active": true })).await;
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(format!("{}/random_path_that_does_not_exist", app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn loaded_attempt_waits_in_briefing() {
    let app = spawn_app().await;

    let session = app.get_session().await;
    assert_eq!(session["phase"], "briefing");
    assert_eq!(session["question_count"], 3);
    assert_eq!(session["warning_count"], 0);
    assert_eq!(session["warning_limit"], 3);
    assert!(session["remaining_seconds"].as_i64().unwrap() > 29 * 60);
    assert_eq!(session["listening"].as_array().unwrap().len(), 0);

    // Answers are closed until the briefing is accepted.
    let response = app
        .post("/answers", json!({ "question_id": 1, "option": "Network" }))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn unknown_attempt_renders_load_error() {
    let app = spawn_app_for("att-served", "att-missing").await;

    let session = app.get_session().await;
    assert_eq!(session["phase"], "error");
    assert!(session["error"].as_str().unwrap().contains("attempt not found"));
    assert_eq!(session["retryable"], false);

    let response = app.post("/briefing", json!({ "accept": true })).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn navigation_waits_for_fullscreen() {
    let app = spawn_app().await;

    let response = app.post("/briefing", json!({ "accept": true })).await;
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["phase"], "active");
    assert_eq!(session["fullscreen_wanted"], true);
    assert_eq!(session["listening"].as_array().unwrap().len(), 7);

    let response = app.post("/navigate", json!({ "index": 1 })).await;
    assert_eq!(response.status().as_u16(), 412);

    let signalled = app
        .signal(json!({ "type": "webkitfullscreenchange", "active": true }))
        .await;
    assert_eq!(signalled["session"]["fullscreen_wanted"], false);
    assert_eq!(signalled["recorded"], 0);

    let response = app.post("/navigate", json!({ "index": 1 })).await;
    assert_eq!(response.status().as_u16(), 200);
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["current_index"], 1);
    assert_eq!(session["violation_count"], 0);
}

#[tokio::test]
async fn blocked_shortcut_tells_shell_to_prevent_default() {
    let app = spawn_app().await;
    begin(&app).await;

    let outcome = app.signal(json!({ "type": "keydown", "key": "F12" })).await;
    assert_eq!(outcome["blocked"], true);
    assert_eq!(outcome["recorded"], 1);
    assert_eq!(outcome["session"]["blocked_key_count"], 1);
    assert_eq!(outcome["session"]["phase"], "active");

    let outcome = app
        .signal(json!({ "type": "keydown", "key": "a", "ctrl": true }))
        .await;
    assert_eq!(outcome["blocked"], false);
    assert_eq!(outcome["recorded"], 0);
}

#[tokio::test]
async fn fullscreen_exit_opens_locked_warning() {
    let app = spawn_app().await;
    begin(&app).await;

    let outcome = app
        .signal(json!({ "type": "fullscreenchange", "active": false }))
        .await;
    let session = &outcome["session"];
    assert_eq!(session["phase"], "warning");
    assert_eq!(session["warning"]["count"], 1);
    assert_eq!(session["warning"]["countdown_remaining"], 15);
    assert_eq!(
        session["warning_headline"],
        "Warning 1/3: You exited fullscreen mode."
    );

    let response = app.post("/warning/dismiss", json!({})).await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post("/answers", json!({ "question_id": 1, "option": "Network" }))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn manual_submission_reaches_grader_once() {
    let app = spawn_app().await;
    begin(&app).await;

    let response = app
        .post("/answers", json!({ "question_id": 1, "option": "Network" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.post("/submit", json!({})).await;
    assert_eq!(response.status().as_u16(), 400);
    assert!(app.grader.submissions().is_empty());

    for (id, option) in [(2, "Link"), (3, "Transport")] {
        let response = app
            .post("/answers", json!({ "question_id": id, "option": option }))
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }
    let response = app.post("/flags/2", json!({})).await;
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["flagged"], json!([2]));

    let response = app.post("/submit", json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["passed"], true);
    assert_eq!(body["session"]["phase"], "submitted");

    let sent = app.grader.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["is_auto_submit"], false);
    assert_eq!(sent[0]["answers"]["3"], "Transport");
    assert!(sent[0].get("auto_submit_reason").is_none());

    let response = app.post("/submit", json!({})).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn third_tab_switch_auto_submits() {
    let app = spawn_app().await;
    begin(&app).await;

    let mut last = Value::Null;
    for _ in 0..3 {
        app.signal(json!({ "type": "visibilitychange", "hidden": true }))
            .await;
        last = app
            .signal(json!({ "type": "visibilitychange", "hidden": false }))
            .await;
    }

    let session = &last["session"];
    assert_eq!(session["phase"], "submitted");
    assert_eq!(session["auto_submit_reason"], "tab-switch limit reached");
    assert_eq!(session["tab_switch_count"], 3);
    assert_eq!(session["listening"].as_array().unwrap().len(), 0);

    let sent = app.grader.submissions();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["is_auto_submit"], true);
    assert_eq!(sent[0]["tab_switch_count"], 3);
    assert_eq!(sent[0]["violations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn declined_briefing_cancels_session() {
    let app = spawn_app().await;

    let response = app.post("/briefing", json!({ "accept": false })).await;
    let session: Value = response.json().await.unwrap();
    assert_eq!(session["phase"], "cancelled");

    let response = app.post("/briefing", json!({ "accept": true })).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn malformed_signal_is_rejected() {
    let app = spawn_app().await;
    begin(&app).await;

    let response = app.post("/signals", json!({ "type": "teleport" })).await;
    assert!(response.status().is_client_error());

    let session = app.get_session().await;
    assert_eq!(session["violation_count"], 0);
}

#[tokio::test]
async fn grading_client_maps_statuses() {
    let attempt_id = format!("att-{}", uuid::Uuid::new_v4());
    let (url, _stub) = spawn_grader(&attempt_id).await;

    let client =
        HttpGradingClient::new(url.clone(), TEST_TOKEN.to_string(), Duration::from_secs(5)).unwrap();
    let payload = client.fetch_attempt(&attempt_id).await.unwrap();
    assert_eq!(payload.attempt_id, attempt_id);
    assert_eq!(payload.questions.len(), 3);

    assert!(matches!(
        client.fetch_attempt("att-unknown").await,
        Err(AppError::AttemptNotFound(_))
    ));

    let anonymous =
        HttpGradingClient::new(url, "wrong".to_string(), Duration::from_secs(5)).unwrap();
    assert!(matches!(
        anonymous.fetch_attempt(&attempt_id).await,
        Err(AppError::Unauthenticated(_))
    ));
}

#[tokio::test]
async fn unreachable_grader_is_network_failure() {
    // Bind then drop to obtain a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let url = Url::parse(&format!("http://127.0.0.1:{}", port)).unwrap();
    let client = HttpGradingClient::new(url, TEST_TOKEN.to_string(), Duration::from_secs(2)).unwrap();

    assert!(matches!(
        client.fetch_attempt("att-1").await,
        Err(AppError::NetworkFailure(_))
    ));
}
