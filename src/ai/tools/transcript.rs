use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::config::TranscriptConfig;
use crate::core::{AppConfig, RetryPolicy, ServiceError};
use crate::openai::{Function, Parameters, Property, ToolCall, ToolType};
use crate::youtube::{TranscriptClient, TranscriptResponse, validate_video_url};

#[derive(Serialize)]
pub struct TranscriptProps {
    pub url: Property,
}

#[derive(Deserialize)]
pub struct TranscriptArgs {
    pub url: String,
}

/// Answers with a JSON `TranscriptResponse` rather than free text.
#[derive(Serialize)]
pub struct YoutubeTranscriptTool {
    pub r#type: ToolType,
    pub function: Function<TranscriptProps>,
    #[serde(skip)]
    config: TranscriptConfig,
    #[serde(skip)]
    policy: RetryPolicy,
}

impl YoutubeTranscriptTool {
    async fn transcript(&self, args: &str) -> TranscriptResponse {
        let fn_args: TranscriptArgs = match serde_json::from_str(args) {
            Ok(a) => a,
            Err(e) => return TranscriptResponse::failed(format!("Error: invalid arguments: {}", e)),
        };
        if !validate_video_url(&fn_args.url) {
            return TranscriptResponse::failed(String::from("Error: video URL cannot be empty"));
        }

        let client = match TranscriptClient::from_config(&self.config, self.policy.clone()) {
            Ok(client) => client,
            Err(e) => return TranscriptResponse::failed(format!("Configuration error: {}", e)),
        };
        match client.get_transcript(&fn_args.url).await {
            Ok(text) => TranscriptResponse::ok(text),
            Err(e) => {
                tracing::error!("Transcript lookup failed: {:#}", e);
                let error = match ServiceError::find(&e) {
                    Some(ServiceError::Http { status, .. }) => {
                        format!("API error: request failed with status code {}", status)
                    }
                    _ => format!("Error: {:#}", e),
                };
                TranscriptResponse::failed(error)
            }
        }
    }
}

#[async_trait]
impl ToolCall for YoutubeTranscriptTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        tracing::info!("Fetching video transcript");
        let response = self.transcript(args).await;
        Ok(serde_json::to_string(&response)?)
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl YoutubeTranscriptTool {
    pub fn new(config: &AppConfig) -> Self {
        let function = Function {
            name: String::from("youtube_transcript"),
            description: String::from(
                "Get the transcript (subtitles) of a YouTube video. Returns JSON with `success`, `transcript` and `error`.",
            ),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: TranscriptProps {
                    url: Property::new(
                        "string",
                        "URL of the video (youtube.com/watch?v=ID, youtu.be/ID, or a bare ID).",
                    ),
                },
                required: vec![String::from("url")],
                additional_properties: false,
            },
            strict: true,
        };
        Self {
            r#type: ToolType::Function,
            function,
            config: config.transcript.clone(),
            policy: config.retry.transcript.clone(),
        }
    }
}
