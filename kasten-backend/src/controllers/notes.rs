//! Kasten REST API: read-only traversal of the note index.
//!
//! Notes are never written through the API; the only mutation is
//! `POST /api/rescan`, which rebuilds the index from the notes directory.

use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::AppState;

fn db_error(context: &str, e: impl std::fmt::Display) -> HttpResponse {
    log::error!("{}: {}", context, e);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": format!("{}: {}", context, e)
    }))
}

fn not_found(message: &str) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({ "error": message }))
}

#[derive(Debug, Deserialize)]
struct ListNotesQuery {
    q: Option<String>,
}

/// List all notes, optionally filtered by a substring of id or title
async fn list_notes(data: web::Data<AppState>, query: web::Query<ListNotesQuery>) -> impl Responder {
    let result = match query.q.as_deref() {
        Some(q) => data.db.search_notes(q),
        None => data.db.list_notes(),
    };

    match result {
        Ok(notes) => HttpResponse::Ok().json(notes),
        Err(e) => db_error("Failed to list notes", e),
    }
}

/// Note with body, outgoing links and backlinks
async fn get_note(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();

    match data.index.note_detail(&id) {
        Ok(Some(detail)) => HttpResponse::Ok().json(detail),
        Ok(None) => not_found("Note not found"),
        Err(e) => db_error("Failed to load note", e),
    }
}

async fn get_backlinks(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let id = path.into_inner();

    match data.db.backlinks(&id) {
        Ok(links) => HttpResponse::Ok().json(links),
        Err(e) => db_error("Failed to load backlinks", e),
    }
}

async fn entry_points(data: web::Data<AppState>) -> impl Responder {
    match data.db.entry_points() {
        Ok(notes) => HttpResponse::Ok().json(notes),
        Err(e) => db_error("Failed to compute entry points", e),
    }
}

async fn orphans(data: web::Data<AppState>) -> impl Responder {
    match data.db.orphans() {
        Ok(notes) => HttpResponse::Ok().json(notes),
        Err(e) => db_error("Failed to compute orphans", e),
    }
}

async fn random_note(data: web::Data<AppState>) -> impl Responder {
    match data.index.random_note() {
        Ok(Some(id)) => HttpResponse::Ok().json(serde_json::json!({ "id": id })),
        Ok(None) => not_found("No notes indexed"),
        Err(e) => db_error("Failed to pick random note", e),
    }
}

async fn broken_links(data: web::Data<AppState>) -> impl Responder {
    match data.db.broken_links() {
        Ok(links) => HttpResponse::Ok().json(links),
        Err(e) => db_error("Failed to list broken links", e),
    }
}

#[derive(Debug, Serialize)]
struct TagItem {
    tag: String,
    count: usize,
}

async fn list_tags(data: web::Data<AppState>) -> impl Responder {
    match data.db.list_tags() {
        Ok(tags) => {
            let items: Vec<TagItem> = tags
                .into_iter()
                .map(|(tag, count)| TagItem { tag, count })
                .collect();
            HttpResponse::Ok().json(items)
        }
        Err(e) => db_error("Failed to list tags", e),
    }
}

async fn stats(data: web::Data<AppState>) -> impl Responder {
    match data.db.index_stats() {
        Ok(stats) => HttpResponse::Ok().json(stats),
        Err(e) => db_error("Failed to read index stats", e),
    }
}

/// Rebuild the index from the notes directory
async fn rescan(data: web::Data<AppState>) -> impl Responder {
    let index = data.index.clone();
    match web::block(move || index.rescan()).await {
        Ok(Ok(report)) => HttpResponse::Ok().json(report),
        Ok(Err(e)) => db_error("Rescan failed", e),
        Err(e) => db_error("Rescan task failed", e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/notes", web::get().to(list_notes))
            .route("/notes/{id}", web::get().to(get_note))
            .route("/notes/{id}/backlinks", web::get().to(get_backlinks))
            .route("/entry-points", web::get().to(entry_points))
            .route("/orphans", web::get().to(orphans))
            .route("/random", web::get().to(random_note))
            .route("/broken-links", web::get().to(broken_links))
            .route("/tags", web::get().to(list_tags))
            .route("/stats", web::get().to(stats))
            .route("/rescan", web::post().to(rescan)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::Database;
    use crate::notes::NoteIndex;
    use actix_web::{http::StatusCode, test, App};
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    fn state_for(dir: &Path) -> web::Data<AppState> {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let index = Arc::new(NoteIndex::new(dir.to_path_buf(), db.clone()));
        web::Data::new(AppState {
            db,
            index,
            config: Config::for_notes_dir(dir.to_path_buf()),
            started_at: std::time::Instant::now(),
        })
    }

    fn seed(dir: &Path) {
        fs::write(dir.join("hub.md"), "# Hub\n\n[[a]] [[b]] #index").unwrap();
        fs::write(dir.join("a.md"), "# Note A\n\nsee [[b]]").unwrap();
        fs::write(dir.join("b.md"), "# Note B").unwrap();
    }

    #[actix_web::test]
    async fn test_rescan_then_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let app = test::init_service(App::new().app_data(state_for(dir.path())).configure(config)).await;

        let req = test::TestRequest::post().uri("/api/rescan").to_request();
        let report: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(report["notes_indexed"], 3);
        assert_eq!(report["links_indexed"], 3);

        let req = test::TestRequest::get().uri("/api/entry-points").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["id"], "hub");
        assert_eq!(body[0]["outgoing_count"], 2);
    }

    #[actix_web::test]
    async fn test_get_note_detail_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let state = state_for(dir.path());
        state.index.rescan().unwrap();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/notes/b").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["title"], "Note B");
        let backlinks: Vec<&str> = body["backlinks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|l| l["id"].as_str().unwrap())
            .collect();
        assert_eq!(backlinks, vec!["a", "hub"]);

        let req = test::TestRequest::get().uri("/api/notes/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_note_removed_since_scan_is_404() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let state = state_for(dir.path());
        state.index.rescan().unwrap();
        std::fs::remove_file(dir.path().join("b.md")).unwrap();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/notes/b").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_random_on_empty_index_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(App::new().app_data(state_for(dir.path())).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/random").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_search_and_tags() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path());
        let state = state_for(dir.path());
        state.index.rescan().unwrap();
        let app = test::init_service(App::new().app_data(state).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/notes?q=note").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let req = test::TestRequest::get().uri("/api/tags").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body[0]["tag"], "index");
        assert_eq!(body[0]["count"], 1);
    }
}
