//! OpenAI-compatible function tool definitions.
//!
//! Tools serialize to the `{"type": "function", "function": {...}}`
//! shape expected by chat completion APIs, so any agent that speaks that
//! format can discover and call them.

use anyhow::{Error, Result};
use async_trait::async_trait;
use erased_serde;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Items {
    pub r#type: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Property {
    pub r#type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Items>,
}

impl Property {
    pub fn new(r#type: &str, description: &str) -> Self {
        Self {
            r#type: r#type.to_string(),
            description: description.to_string(),
            items: None,
        }
    }

    /// Array of strings.
    pub fn string_list(description: &str) -> Self {
        Self {
            r#type: String::from("array"),
            description: description.to_string(),
            items: Some(Items {
                r#type: String::from("string"),
            }),
        }
    }
}

#[derive(Serialize)]
pub struct Parameters<Props: Serialize> {
    pub r#type: String,
    pub properties: Props,
    pub required: Vec<String>,
    #[serde(rename = "additionalProperties")]
    pub additional_properties: bool,
}

#[derive(Serialize)]
pub struct Function<Props: Serialize> {
    pub name: String,
    pub description: String,
    pub parameters: Parameters<Props>,
    pub strict: bool,
}

#[derive(Serialize)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

// `serde::Serialize` is not object safe, so tool definitions go through
// `erased_serde` to be serialized from behind a `dyn ToolCall`.
#[async_trait]
pub trait ToolCall: erased_serde::Serialize {
    async fn call(&self, args: &str) -> Result<String, Error>;
    fn function_name(&self) -> String;
}
erased_serde::serialize_trait_object!(ToolCall);

pub type BoxedToolCall = Box<dyn ToolCall + Send + Sync + 'static>;
