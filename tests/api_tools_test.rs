//! Integration tests for the tools API endpoints

mod test_utils;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use serial_test::serial;
    use tower::util::ServiceExt;

    use crate::test_utils::{body_to_string, test_app, test_app_with, test_config};

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn output_of(app: axum::Router, uri: &str, body: &str) -> String {
        let response = app.oneshot(post(uri, body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_to_string(response.into_body()).await;
        let json: Value = serde_json::from_str(&body).unwrap();
        json["output"].as_str().unwrap().to_string()
    }

    /// Tests listing returns every tool definition
    #[tokio::test]
    #[serial]
    async fn it_lists_tool_definitions() {
        let app = test_app();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tools")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_to_string(response.into_body()).await;
        let json: Value = serde_json::from_str(&body).unwrap();
        let tools = json.as_array().unwrap();
        assert_eq!(tools.len(), 9);
        assert!(tools.iter().all(|t| t["type"] == "function"));

        let send_email = tools
            .iter()
            .find(|t| t["function"]["name"] == "send_email")
            .unwrap();
        assert_eq!(
            send_email["function"]["parameters"]["properties"]["to"]["type"],
            "array"
        );
    }

    /// Tests an unknown tool name is a 404
    #[tokio::test]
    #[serial]
    async fn it_returns_404_for_unknown_tool() {
        let app = test_app();
        let response = app.oneshot(post("/api/tools/launch_rockets", "{}")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    /// Tests a tool answers invalid arguments with text rather than an
    /// HTTP error
    #[tokio::test]
    #[serial]
    async fn it_reports_invalid_arguments_as_output() {
        let output = output_of(test_app(), "/api/tools/create_calendar_event", "not json").await;
        assert!(output.starts_with("Error: invalid arguments"));
    }

    /// Tests an update without any field never reaches the calendar
    #[tokio::test]
    #[serial]
    async fn it_skips_empty_calendar_updates() {
        let output = output_of(
            test_app(),
            "/api/tools/update_calendar_event",
            r#"{"event_id": "evt-1"}"#,
        )
        .await;
        assert_eq!(output, "No update information provided.");
    }

    /// Tests missing credentials are reported as configuration errors
    #[tokio::test]
    #[serial]
    async fn it_reports_configuration_errors() {
        let output = output_of(test_app(), "/api/tools/list_calendar_events", "").await;
        assert!(output.starts_with("Configuration error"));
        assert!(output.contains("errand auth"));

        let output = output_of(test_app(), "/api/tools/retrieve_emails", "{}").await;
        assert_eq!(
            output,
            "Configuration error: Email configuration (SMTP/IMAP) incomplete"
        );
    }

    /// Tests a transcript is fetched through the mocked video API
    #[tokio::test]
    #[serial]
    async fn it_fetches_a_transcript() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/video/subtitles")
            .match_query(mockito::Matcher::UrlEncoded(
                "video_id".into(),
                "dQw4w9WgXcQ".into(),
            ))
            .match_header("x-rapidapi-key", "test-key")
            .with_status(200)
            .with_body(r#"{"subtitles": [{"text": "never gonna"}, {"text": "give you up"}]}"#)
            .create_async()
            .await;

        let mut config = test_config();
        config.transcript.rapid_api_key = Some(String::from("test-key"));
        config.transcript.base_url = server.url();

        let output = output_of(
            test_app_with(config),
            "/api/tools/youtube_transcript",
            r#"{"url": "https://www.youtube.com/watch?v=dQw4w9WgXcQ"}"#,
        )
        .await;
        let result: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["transcript"], "never gonna give you up");
    }
}
