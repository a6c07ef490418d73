//! Video transcripts through the RapidAPI `youtube-v2` service.

pub mod transcript;
pub use transcript::{TranscriptResponse, extract_video_id, format_transcript, validate_video_url};

use anyhow::Result;
use serde::Deserialize;

use crate::core::config::{TranscriptConfig, mask_secret};
use crate::core::error::error_for_status;
use crate::core::{RetryPolicy, ServiceError, with_retry};
use transcript::Segment;

pub const NO_TRANSCRIPT: &str = "No transcript available for this video";

#[derive(Debug, Deserialize)]
struct SubtitlesResponse {
    #[serde(default)]
    subtitles: Option<Vec<Segment>>,
}

pub struct TranscriptClient {
    api_key: String,
    api_host: String,
    base_url: String,
    policy: RetryPolicy,
    http: reqwest::Client,
}

impl TranscriptClient {
    pub fn from_config(config: &TranscriptConfig, policy: RetryPolicy) -> Result<Self> {
        let Some(api_key) = config.rapid_api_key.clone() else {
            return Err(ServiceError::config(
                "RapidAPI key is missing. Set ERRAND_RAPIDAPI_KEY.",
            )
            .into());
        };
        Ok(Self {
            api_key,
            api_host: config.rapid_api_host.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            policy,
            http: reqwest::Client::new(),
        })
    }

    /// Transcript text for a video URL or id. A video without subtitles
    /// is not an error.
    pub async fn get_transcript(&self, video_url: &str) -> Result<String> {
        let video_id = extract_video_id(video_url)?;
        tracing::info!("Fetching transcript for video {}", video_id);

        let url = format!("{}/video/subtitles", self.base_url);
        tracing::debug!("Requesting {} with key {}", url, mask_secret(&self.api_key));

        let data: SubtitlesResponse = with_retry(&self.policy, || async {
            let resp = self
                .http
                .get(&url)
                .header("x-rapidapi-host", &self.api_host)
                .header("x-rapidapi-key", &self.api_key)
                .query(&[("video_id", video_id.as_str())])
                .send()
                .await?;
            Ok(error_for_status(resp).await?.json().await?)
        })
        .await?;

        match data.subtitles {
            Some(segments) if !segments.is_empty() => {
                let text = format_transcript(&segments);
                tracing::info!("Retrieved transcript ({} chars)", text.len());
                Ok(text)
            }
            _ => {
                tracing::warn!("No subtitles found for video {}", video_id);
                Ok(NO_TRANSCRIPT.to_string())
            }
        }
    }
}
