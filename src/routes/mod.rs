pub mod posts;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::Uri;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::media::MediaError;
use crate::state::AppState;

/// The full HTTP surface: JSON API, static uploads, 404 fallback.
pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(state.media.root());
    let body_limit = state.config.server.max_body_bytes;

    Router::new()
        .merge(users::router())
        .merge(posts::router())
        .nest_service("/uploads", uploads)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Not Found - {}", uri.path()))
}

/// Map a rejected upload to the caller-facing message for that kind of file.
fn upload_error(too_large: &'static str) -> impl Fn(MediaError) -> AppError {
    move |err| match err {
        MediaError::TooLarge { .. } => AppError::Validation(too_large.to_string()),
        other => other.into(),
    }
}
