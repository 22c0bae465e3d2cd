//! HTTP route handlers.

pub mod health;
pub mod search;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Full application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(search::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
