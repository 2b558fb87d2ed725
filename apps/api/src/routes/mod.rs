pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::estimation::handlers;
use crate::state::AppState;

/// Above the document limit, so oversized CVs reach input validation.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/salary/estimate", post(handlers::handle_estimate))
        .route("/api/v1/salary/schema", get(handlers::handle_schema))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
