//! Test utilities for integration tests
use std::env;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{Router, body::Body};

use errand::api::AppState;
use errand::api::app;
use errand::core::config::{
    CalendarConfig, EmailConfig, RetrySettings, TranscriptConfig, WhatsAppConfig,
};
use errand::core::{AppConfig, RetryPolicy};

/// A configuration with no credentials at all that never reads the
/// environment. Services it points at are unreachable.
pub fn test_config() -> AppConfig {
    // A unique, never created directory so the calendar token file is
    // always missing
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        .to_string();
    let dir = env::temp_dir().join(format!("errand-test-{}", ts));
    let fast = Duration::from_millis(1);

    AppConfig {
        calendar: CalendarConfig {
            calendar_id: String::from("primary"),
            timezone: String::from("Europe/Paris"),
            token_file: dir.join("token.json"),
            credentials_file: dir.join("credentials.json"),
            read_only: false,
            api_base_url: String::from("http://127.0.0.1:1"),
            auth_url: String::from("http://127.0.0.1:1/auth"),
            token_url: String::from("http://127.0.0.1:1/token"),
        },
        whatsapp: WhatsAppConfig::default(),
        email: EmailConfig::default(),
        transcript: TranscriptConfig {
            rapid_api_key: None,
            rapid_api_host: String::from("youtube-v2.p.rapidapi.com"),
            base_url: String::from("http://127.0.0.1:1"),
        },
        retry: RetrySettings {
            calendar: RetryPolicy::calendar().with_base_delay(fast),
            messaging: RetryPolicy::messaging().with_base_delay(fast),
            email: RetryPolicy::email().with_base_delay(fast),
            transcript: RetryPolicy::transcript().with_base_delay(fast),
        },
    }
}

/// Creates a test application router from `config`.
///
/// Tests sharing a mock server should be marked `#[serial]`.
pub fn test_app_with(config: AppConfig) -> Router {
    app(Arc::new(AppState::new(config)))
}

pub fn test_app() -> Router {
    test_app_with(test_config())
}

pub async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}
