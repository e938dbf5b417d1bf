pub mod assets;
pub mod auth;
pub mod blog;
pub mod uploads;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::views;

/// Every route of the app, with tracing, the upload size limit and the
/// not-found page personalization applied.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.storage.max_upload_bytes;

    Router::new()
        .route("/assets/{*path}", get(assets::serve))
        .route("/uploads/{filename}", get(uploads::serve))
        .merge(auth::router())
        .merge(blog::router())
        .fallback(views::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            views::personalize_not_found,
        ))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
