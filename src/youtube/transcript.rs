use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Video id from a `watch?v=<ID>` or `youtu.be/<ID>` URL. Anything else
/// is assumed to already be an id and returned unchanged.
pub fn extract_video_id(url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        bail!("Video URL cannot be empty");
    }

    if let Some((_, rest)) = url.split_once("watch?v=") {
        let id = rest.split('&').next().unwrap_or(rest);
        return Ok(id.to_string());
    }
    if let Some((_, rest)) = url.split_once("youtu.be/") {
        return Ok(rest.to_string());
    }
    Ok(url.to_string())
}

pub fn validate_video_url(url: &str) -> bool {
    extract_video_id(url).is_ok()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Segment {
    #[serde(default)]
    pub text: String,
}

/// Caption text in order, separated by single spaces.
pub fn format_transcript(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TranscriptResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptResponse {
    pub fn ok(transcript: String) -> Self {
        Self {
            success: true,
            transcript: Some(transcript),
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            success: false,
            transcript: None,
            error: Some(error),
        }
    }
}
