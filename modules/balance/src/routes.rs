//! Axum route handlers for the balance module RPC API and the ForwardAuth check.

use crate::rhythm::{Rhythm, RhythmError};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use balance_types::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_WINDOW_DAYS: i64 = 7;

pub struct AppState {
    pub rhythm: Rhythm,
    /// Where ForwardAuth sends blocked requests; None answers 403
    pub blocked_redirect: Option<String>,
    pub start_time: Instant,
}

type RpcResult<T> = (StatusCode, Json<RpcResponse<T>>);

fn fail<T: serde::Serialize>(e: RhythmError) -> RpcResult<T> {
    let code = match &e {
        RhythmError::Conflict(_) => StatusCode::CONFLICT,
        RhythmError::Invalid(_) => StatusCode::BAD_REQUEST,
        RhythmError::NotFound(_) => StatusCode::NOT_FOUND,
        RhythmError::Db(_) => {
            log::error!("[BALANCE] {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (code, Json(RpcResponse::err(e.to_string())))
}

fn respond<T: serde::Serialize>(result: Result<T, RhythmError>) -> RpcResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(RpcResponse::ok(data))),
        Err(e) => fail(e),
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rpc/state", get(rhythm_state))
        .route("/rpc/sessions", get(list_sessions))
        .route("/rpc/sessions/start", post(start_session))
        .route("/rpc/sessions/complete", post(complete_session))
        .route("/rpc/sessions/abandon", post(abandon_session))
        .route("/rpc/break/start", post(start_break))
        .route("/rpc/break/end", post(end_break))
        .route("/rpc/priorities", get(list_priorities).post(create_priority))
        .route("/rpc/priorities/:id/archive", post(archive_priority))
        .route("/rpc/drift", get(drift))
        .route("/rpc/status", get(status))
        .route("/auth/check", get(auth_check))
        .with_state(state)
}

// GET /rpc/state
pub async fn rhythm_state(State(state): State<Arc<AppState>>) -> RpcResult<RhythmState> {
    respond(state.rhythm.state(Utc::now()))
}

// POST /rpc/sessions/start
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSessionRequest>,
) -> RpcResult<Session> {
    respond(state.rhythm.start_session(&req, Utc::now()))
}

// POST /rpc/sessions/complete
pub async fn complete_session(State(state): State<Arc<AppState>>) -> RpcResult<RhythmState> {
    respond(state.rhythm.complete_session(Utc::now()))
}

// POST /rpc/sessions/abandon
pub async fn abandon_session(State(state): State<Arc<AppState>>) -> RpcResult<Session> {
    respond(state.rhythm.abandon_session(Utc::now()))
}

// GET /rpc/sessions?days=N
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<WindowQuery>,
) -> RpcResult<Vec<Session>> {
    respond(state.rhythm.sessions(q.days.unwrap_or(DEFAULT_WINDOW_DAYS), Utc::now()))
}

// POST /rpc/break/start
pub async fn start_break(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartBreakRequest>,
) -> RpcResult<RhythmState> {
    respond(state.rhythm.take_break(req.minutes, Utc::now()))
}

// POST /rpc/break/end
pub async fn end_break(State(state): State<Arc<AppState>>) -> RpcResult<RhythmState> {
    respond(state.rhythm.end_break(Utc::now()))
}

// POST /rpc/priorities
pub async fn create_priority(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePriorityRequest>,
) -> RpcResult<Priority> {
    match state.rhythm.create_priority(&req) {
        Ok(p) => (StatusCode::CREATED, Json(RpcResponse::ok(p))),
        Err(e) => fail(e),
    }
}

// GET /rpc/priorities
pub async fn list_priorities(State(state): State<Arc<AppState>>) -> RpcResult<Vec<Priority>> {
    respond(state.rhythm.db().list_priorities(true).map_err(RhythmError::from))
}

// POST /rpc/priorities/:id/archive
pub async fn archive_priority(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> RpcResult<Priority> {
    let result = match state.rhythm.db().archive_priority(id) {
        Ok(Some(p)) => Ok(p),
        Ok(None) => Err(RhythmError::NotFound(format!("Priority {} not found", id))),
        Err(e) => Err(e.into()),
    };
    respond(result)
}

// GET /rpc/drift?days=N
pub async fn drift(State(state): State<Arc<AppState>>, Query(q): Query<WindowQuery>) -> RpcResult<DriftReport> {
    respond(state.rhythm.drift(q.days.unwrap_or(DEFAULT_WINDOW_DAYS), Utc::now()))
}

// GET /rpc/status
pub async fn status(State(state): State<Arc<AppState>>) -> RpcResult<ServiceStatus> {
    let now = Utc::now();
    let result = state.rhythm.state(now).and_then(|rs| {
        let (sessions_total, priorities) = state.rhythm.db().counts()?;
        Ok(ServiceStatus {
            running: true,
            uptime_secs: state.start_time.elapsed().as_secs(),
            mode: rs.mode,
            sessions_total,
            priorities,
        })
    });
    respond(result)
}

/// Traefik ForwardAuth endpoint. 200 lets the request through; anything
/// else is returned to the client as-is.
pub async fn auth_check(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let host = headers
        .get("x-forwarded-host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    let remaining = match state.rhythm.break_remaining(Utc::now()) {
        Ok(r) => r,
        Err(e) => {
            // Fail open
            log::error!("[BALANCE] Auth check failed: {}", e);
            return StatusCode::OK.into_response();
        }
    };

    let Some(secs) = remaining else {
        log::debug!("[BALANCE] Auth check for {}: allowed", host);
        return StatusCode::OK.into_response();
    };

    log::debug!("[BALANCE] Auth check for {}: blocked for {}s", host, secs);
    match &state.blocked_redirect {
        Some(url) => (StatusCode::FOUND, [(header::LOCATION, url.clone())]).into_response(),
        None => (
            StatusCode::FORBIDDEN,
            [(header::RETRY_AFTER, secs.to_string())],
            format!("On break. Back in {} min.\n", (secs + 59) / 60),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::rhythm::RhythmConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app_with(blocked_redirect: Option<String>) -> Router {
        router(Arc::new(AppState {
            rhythm: Rhythm::new(Db::open_in_memory().unwrap(), RhythmConfig::default()),
            blocked_redirect,
            start_time: Instant::now(),
        }))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        app.clone().oneshot(request).await.unwrap()
    }

    async fn json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_auth_check_allows_when_active() {
        let app = app_with(None);
        let response = send(&app, "GET", "/auth/check", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_auth_check_blocks_during_break() {
        let app = app_with(None);
        let response = send(&app, "POST", "/rpc/break/start", Some(serde_json::json!({ "minutes": 10 }))).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = send(&app, "GET", "/auth/check", None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let retry: i64 = response.headers()[header::RETRY_AFTER].to_str().unwrap().parse().unwrap();
        assert!(retry > 0 && retry <= 600);
    }

    #[tokio::test]
    async fn test_auth_check_redirects_when_configured() {
        let app = app_with(Some("https://blocked.example/".to_string()));
        send(&app, "POST", "/rpc/break/start", Some(serde_json::json!({}))).await;

        let response = send(&app, "GET", "/auth/check", None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "https://blocked.example/");
    }

    #[tokio::test]
    async fn test_session_flow() {
        let app = app_with(None);

        let response = send(
            &app,
            "POST",
            "/rpc/sessions/start",
            Some(serde_json::json!({ "intention": "draft essay" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["data"]["status"], "running");
        assert_eq!(body["data"]["planned_minutes"], 25);

        let response = send(&app, "POST", "/rpc/sessions/start", Some(serde_json::json!({}))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = json(send(&app, "POST", "/rpc/sessions/complete", None).await).await;
        assert_eq!(body["data"]["mode"], "break");
        assert_eq!(body["data"]["completed_today"], 1);

        let response = send(&app, "POST", "/rpc/sessions/start", Some(serde_json::json!({}))).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = json(send(&app, "POST", "/rpc/break/end", None).await).await;
        assert_eq!(body["data"]["mode"], "active");
    }

    #[tokio::test]
    async fn test_priorities_and_drift() {
        let app = app_with(None);
        let response = send(
            &app,
            "POST",
            "/rpc/priorities",
            Some(serde_json::json!({ "name": "health", "weight": 2.0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json(response).await["data"]["id"].as_i64().unwrap();

        let response = send(
            &app,
            "POST",
            "/rpc/priorities",
            Some(serde_json::json!({ "name": "zero", "weight": 0 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = json(send(&app, "GET", "/rpc/drift?days=3", None).await).await;
        assert_eq!(body["data"]["window_days"], 3);
        assert_eq!(body["data"]["priorities"][0]["expected_share"], 1.0);

        let response = send(&app, "POST", &format!("/rpc/priorities/{}/archive", id), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let response = send(&app, "POST", "/rpc/priorities/999/archive", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_out_of_range_windows_are_bad_requests() {
        let app = app_with(None);
        let response = send(
            &app,
            "POST",
            "/rpc/break/start",
            Some(serde_json::json!({ "minutes": 1_000_000_000_000_000i64 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "GET", "/rpc/drift?days=9223372036854775807", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = send(&app, "GET", "/rpc/sessions?days=9223372036854775807", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&app, "GET", "/auth/check", None).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
