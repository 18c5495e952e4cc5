use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::handlers::{collections, diagnostics, files, links, suggestions};
use crate::pages;
use crate::state::AppState;

/// Room for multipart boundaries and the other form fields.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    let api = Router::new()
        .route("/links", get(links::list_links).post(links::create_link))
        .route("/links/check-slug", get(links::check_slug))
        .route("/links/export", get(links::export_links))
        .route("/links/import", post(links::import_links))
        .route("/links/:id", put(links::update_link).delete(links::delete_link))
        .route("/collections", post(collections::create_collection))
        .route("/collections/:access_key", get(collections::get_collection))
        .route("/resolve/:slug", get(links::resolve_slug))
        .route("/redirect/:slug", get(links::redirect_slug))
        .route("/suggestions", post(suggestions::suggest_slugs))
        .route("/files", get(files::list_files).post(files::upload_file))
        .route("/upload", post(files::upload_file))
        .route("/files/:id", get(files::get_file).delete(files::delete_file))
        .route("/download/:slug", get(files::download_file))
        .route("/test-db", get(diagnostics::test_db))
        .route("/test-links", get(diagnostics::test_links))
        .route(
            "/test-ai",
            get(diagnostics::test_ai_status).post(diagnostics::test_ai_run),
        );

    Router::new()
        .route("/", get(pages::home).post(pages::submit_link))
        .route("/files", get(pages::files_page).post(pages::upload_page))
        .route("/collection/:access_key", get(pages::collection_page))
        .route("/slug/:slug", get(pages::slug_page))
        .route("/download/:slug", get(files::download_file))
        .route("/download/:slug/success", get(pages::download_success_page))
        .route("/blobs/*key", get(files::serve_blob))
        .nest("/api", api)
        .fallback(pages::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
