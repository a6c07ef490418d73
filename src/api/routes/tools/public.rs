//! Public types for the tools API
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ToolCallResponse {
    pub name: String,
    pub output: String,
}
