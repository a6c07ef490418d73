//! API routes module

pub mod tools;

use std::sync::Arc;

use crate::api::state::AppState;
use axum::Router;

type SharedState = Arc<AppState>;

/// Create the combined API router
pub fn router() -> Router<SharedState> {
    Router::new()
        // Tool listing and invocation
        .nest("/tools", tools::router())
}
