//! Tools exposed to an agent. Every tool answers with text, failures
//! included, so a caller never has to handle an error from `call`.

pub mod calendar;
pub use calendar::{
    CreateCalendarEventTool, DeleteCalendarEventTool, ListCalendarEventsTool,
    UpdateCalendarEventTool,
};

pub mod email;
pub use email::{RetrieveEmailsTool, SendEmailTool};

pub mod transcript;
pub use transcript::YoutubeTranscriptTool;

pub mod whatsapp;
pub use whatsapp::{ReplyWhatsAppChatTool, SendWhatsAppMessageTool};

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::core::{AppConfig, ServiceError};
use crate::google::CalendarClient;
use crate::openai::BoxedToolCall;

/// Deserialize tool arguments, or the error text to hand back.
pub(crate) fn parse_args<T: DeserializeOwned>(args: &str) -> Result<T, String> {
    serde_json::from_str(args).map_err(|e| {
        tracing::warn!("Invalid tool arguments {}: {}", args, e);
        format!("Error: invalid arguments: {}", e)
    })
}

/// Text for a failed operation. Missing settings get their own message.
pub(crate) fn failure(action: &str, err: &anyhow::Error) -> String {
    if let Some(ServiceError::Config(msg)) = ServiceError::find(err) {
        tracing::error!("Configuration error while {}: {}", action, msg);
        return format!("Configuration error: {}", msg);
    }
    tracing::error!("Error while {}: {:#}", action, err);
    format!("Error while {}: {:#}", action, err)
}

/// Every tool, wired to the services described by `config`.
pub fn all_tools(config: &AppConfig) -> Vec<BoxedToolCall> {
    let calendar = Arc::new(CalendarClient::new(
        &config.calendar,
        config.retry.calendar.clone(),
    ));
    let tools: Vec<BoxedToolCall> = vec![
        Box::new(ListCalendarEventsTool::new(Arc::clone(&calendar))),
        Box::new(CreateCalendarEventTool::new(Arc::clone(&calendar))),
        Box::new(UpdateCalendarEventTool::new(Arc::clone(&calendar))),
        Box::new(DeleteCalendarEventTool::new(calendar)),
        Box::new(SendWhatsAppMessageTool::new(config)),
        Box::new(ReplyWhatsAppChatTool::new(config)),
        Box::new(SendEmailTool::new(config)),
        Box::new(RetrieveEmailsTool::new(config)),
        Box::new(YoutubeTranscriptTool::new(config)),
    ];
    tools
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_registers_every_tool_once() {
        let tools = all_tools(&AppConfig::default());
        let mut names: Vec<String> = tools.iter().map(|t| t.function_name()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "create_calendar_event",
                "delete_calendar_event",
                "list_calendar_events",
                "reply_whatsapp_chat",
                "retrieve_emails",
                "send_email",
                "send_whatsapp_message",
                "update_calendar_event",
                "youtube_transcript",
            ]
        );
    }

    #[test]
    fn it_serializes_function_definitions() {
        let tools = all_tools(&AppConfig::default());
        let value = serde_json::json!(tools);
        for tool in value.as_array().unwrap() {
            assert_eq!(tool["type"], "function");
            assert_eq!(tool["function"]["parameters"]["type"], "object");
        }
    }

    #[test]
    fn it_renders_config_errors_distinctly() {
        let err: anyhow::Error = ServiceError::config("Unipile configuration incomplete").into();
        assert_eq!(
            failure("sending", &err),
            "Configuration error: Unipile configuration incomplete"
        );
        let err = anyhow::anyhow!("boom");
        assert_eq!(failure("sending", &err), "Error while sending: boom");
    }
}
