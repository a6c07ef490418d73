//! Router for the tools API

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use serde_json::Value;

use super::public;
use crate::api::public::ApiError;
use crate::api::state::AppState;

type SharedState = Arc<AppState>;

async fn list_tools_handler(State(state): State<SharedState>) -> Result<Json<Value>, ApiError> {
    let definitions = serde_json::to_value(&state.tools)?;
    Ok(Json(definitions))
}

async fn call_tool_handler(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    body: String,
) -> Result<Json<public::ToolCallResponse>, ApiError> {
    let tool = state
        .tool(&name)
        .ok_or_else(|| ApiError::not_found(format!("No tool named '{}'", name)))?;

    // An empty body means a tool called without arguments
    let args = if body.trim().is_empty() {
        String::from("{}")
    } else {
        body
    };
    tracing::debug!("Calling tool {} with {}", name, args);
    let output = tool.call(&args).await?;

    Ok(Json(public::ToolCallResponse { name, output }))
}

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_tools_handler))
        .route("/{name}", post(call_tool_handler))
}
