//! Axum route handlers for the bookmarks module RPC API.

use crate::db::{normalize_url, Db};
use crate::feeds;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{delete, get, post};
use axum::Router;
use bookmarks_types::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

pub struct AppState {
    pub db: Db,
    pub http: reqwest::Client,
    pub start_time: Instant,
}

type RpcResult<T> = (StatusCode, Json<RpcResponse<T>>);

fn internal<T: serde::Serialize>(context: &str, e: impl std::fmt::Display) -> RpcResult<T> {
    log::error!("[BOOKMARKS] {}: {}", context, e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(RpcResponse::err(format!("{}: {}", context, e))),
    )
}

fn not_found<T: serde::Serialize>(what: &str) -> RpcResult<T> {
    (StatusCode::NOT_FOUND, Json(RpcResponse::err(format!("{} not found", what))))
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/rpc/bookmarks", get(list_bookmarks))
        .route("/rpc/bookmarks/add", post(add_bookmark))
        .route("/rpc/bookmarks/:id", get(get_bookmark).delete(delete_bookmark))
        .route("/rpc/bookmarks/:id/pin", post(pin_bookmark))
        .route("/rpc/bookmarks/:id/unpin", post(unpin_bookmark))
        .route("/rpc/sweep", post(sweep))
        .route("/rpc/feeds", get(list_feeds))
        .route("/rpc/feeds/add", post(add_feed))
        .route("/rpc/feeds/poll", post(poll_feeds))
        .route("/rpc/feeds/:id", delete(delete_feed))
        .route("/rpc/status", get(status))
        .with_state(state)
}

// POST /rpc/bookmarks/add
pub async fn add_bookmark(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddBookmarkRequest>,
) -> RpcResult<AddBookmarkResult> {
    let url = match normalize_url(&req.url) {
        Ok(u) => u,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(RpcResponse::err(e))),
    };

    match state.db.add_bookmark(
        &url,
        req.title.as_deref(),
        req.description.as_deref(),
        req.pinned,
        "manual",
        Utc::now(),
    ) {
        Ok((bookmark, created)) => {
            let code = if created { StatusCode::CREATED } else { StatusCode::OK };
            (code, Json(RpcResponse::ok(AddBookmarkResult { bookmark, created })))
        }
        Err(e) => internal("Failed to add bookmark", e),
    }
}

// GET /rpc/bookmarks
pub async fn list_bookmarks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBookmarksQuery>,
) -> RpcResult<Vec<Bookmark>> {
    match state.db.list_bookmarks(query.include_expired, Utc::now()) {
        Ok(list) => (StatusCode::OK, Json(RpcResponse::ok(list))),
        Err(e) => internal("Failed to list bookmarks", e),
    }
}

// GET /rpc/bookmarks/:id
pub async fn get_bookmark(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> RpcResult<Bookmark> {
    match state.db.get_bookmark(id) {
        Ok(Some(b)) => (StatusCode::OK, Json(RpcResponse::ok(b))),
        Ok(None) => not_found("Bookmark"),
        Err(e) => internal("Failed to get bookmark", e),
    }
}

// POST /rpc/bookmarks/:id/pin
pub async fn pin_bookmark(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> RpcResult<Bookmark> {
    match state.db.pin_bookmark(id) {
        Ok(Some(b)) => (StatusCode::OK, Json(RpcResponse::ok(b))),
        Ok(None) => not_found("Bookmark"),
        Err(e) => internal("Failed to pin bookmark", e),
    }
}

// POST /rpc/bookmarks/:id/unpin
pub async fn unpin_bookmark(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> RpcResult<Bookmark> {
    match state.db.unpin_bookmark(id, Utc::now()) {
        Ok(Some(b)) => (StatusCode::OK, Json(RpcResponse::ok(b))),
        Ok(None) => not_found("Bookmark"),
        Err(e) => internal("Failed to unpin bookmark", e),
    }
}

// DELETE /rpc/bookmarks/:id
pub async fn delete_bookmark(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> RpcResult<bool> {
    match state.db.delete_bookmark(id) {
        Ok(true) => (StatusCode::OK, Json(RpcResponse::ok(true))),
        Ok(false) => not_found("Bookmark"),
        Err(e) => internal("Failed to delete bookmark", e),
    }
}

// POST /rpc/sweep
pub async fn sweep(State(state): State<Arc<AppState>>) -> RpcResult<SweepReport> {
    match state.db.sweep_expired(Utc::now()) {
        Ok(deleted) => {
            log::info!("[BOOKMARKS] Manual sweep removed {} expired bookmarks", deleted);
            (StatusCode::OK, Json(RpcResponse::ok(SweepReport { deleted })))
        }
        Err(e) => internal("Sweep failed", e),
    }
}

// POST /rpc/feeds/add
pub async fn add_feed(State(state): State<Arc<AppState>>, Json(req): Json<AddFeedRequest>) -> RpcResult<Feed> {
    let url = match normalize_url(&req.url) {
        Ok(u) => u,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(RpcResponse::err(e))),
    };

    match state.db.add_feed(&url, req.title.as_deref(), Utc::now()) {
        Ok(feed) => (StatusCode::OK, Json(RpcResponse::ok(feed))),
        Err(e) => internal("Failed to add feed", e),
    }
}

// GET /rpc/feeds
pub async fn list_feeds(State(state): State<Arc<AppState>>) -> RpcResult<Vec<Feed>> {
    match state.db.list_feeds() {
        Ok(feeds) => (StatusCode::OK, Json(RpcResponse::ok(feeds))),
        Err(e) => internal("Failed to list feeds", e),
    }
}

// DELETE /rpc/feeds/:id
pub async fn delete_feed(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> RpcResult<bool> {
    match state.db.delete_feed(id) {
        Ok(true) => (StatusCode::OK, Json(RpcResponse::ok(true))),
        Ok(false) => not_found("Feed"),
        Err(e) => internal("Failed to delete feed", e),
    }
}

// POST /rpc/feeds/poll
pub async fn poll_feeds(State(state): State<Arc<AppState>>) -> RpcResult<Vec<FeedPollResult>> {
    match feeds::poll_all(&state.db, &state.http).await {
        Ok(results) => (StatusCode::OK, Json(RpcResponse::ok(results))),
        Err(e) => internal("Feed poll failed", e),
    }
}

// GET /rpc/status
pub async fn status(State(state): State<Arc<AppState>>) -> RpcResult<ServiceStatus> {
    match state.db.counts() {
        Ok((bookmarks, pinned, feeds)) => (
            StatusCode::OK,
            Json(RpcResponse::ok(ServiceStatus {
                running: true,
                uptime_secs: state.start_time.elapsed().as_secs(),
                bookmarks,
                pinned,
                feeds,
                expiry_days: state.db.expiry_days(),
            })),
        ),
        Err(e) => internal("Failed to read status", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        router(Arc::new(AppState {
            db: Db::open_in_memory(7).unwrap(),
            http: reqwest::Client::new(),
            start_time: Instant::now(),
        }))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_add_pin_and_list() {
        let app = app();

        let (status, body) = call(
            &app,
            "POST",
            "/rpc/bookmarks/add",
            Some(serde_json::json!({ "url": "https://example.com/a", "title": "A" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["created"], true);
        let id = body["data"]["bookmark"]["id"].as_i64().unwrap();
        assert!(body["data"]["bookmark"]["expires_at"].is_string());

        let (status, body) = call(&app, "POST", &format!("/rpc/bookmarks/{}/pin", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["pinned"], true);
        assert!(body["data"]["expires_at"].is_null());

        let (_, body) = call(&app, "GET", "/rpc/bookmarks", None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_non_http_url() {
        let app = app();
        let (status, body) = call(
            &app,
            "POST",
            "/rpc/bookmarks/add",
            Some(serde_json::json!({ "url": "javascript:alert(1)" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_missing_bookmark_is_404() {
        let app = app();
        let (status, _) = call(&app, "POST", "/rpc/bookmarks/42/unpin", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "DELETE", "/rpc/bookmarks/42", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sweep_and_status() {
        let app = app();
        let (_, body) = call(&app, "POST", "/rpc/sweep", None).await;
        assert_eq!(body["data"]["deleted"], 0);

        let (_, body) = call(&app, "GET", "/rpc/status", None).await;
        assert_eq!(body["data"]["expiry_days"], 7);
        assert_eq!(body["data"]["running"], true);
    }
}
