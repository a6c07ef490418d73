use std::path::PathBuf;

use anyhow::{Error, Result};
use async_trait::async_trait;
use htmd::HtmlToMarkdown;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{failure, parse_args};
use crate::ai::prompt::{self, Prompt};
use crate::core::config::EmailConfig;
use crate::core::{AppConfig, RetryPolicy};
use crate::mail::{EmailClient, OutgoingMessage, RetrieveQuery, RetrievedMessage};
use crate::openai::{Function, Parameters, Property, ToolCall, ToolType};

const PREVIEW_CHARS: usize = 250;

#[derive(Serialize)]
pub struct SendEmailProps {
    pub to: Property,
    pub subject: Property,
    pub body: Property,
    pub cc: Property,
    pub bcc: Property,
    pub attachments: Property,
}

#[derive(Deserialize)]
pub struct SendEmailArgs {
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    pub cc: Option<Vec<String>>,
    pub bcc: Option<Vec<String>>,
    pub attachments: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct SendEmailTool {
    pub r#type: ToolType,
    pub function: Function<SendEmailProps>,
    #[serde(skip)]
    config: EmailConfig,
    #[serde(skip)]
    policy: RetryPolicy,
}

#[async_trait]
impl ToolCall for SendEmailTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: SendEmailArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        tracing::info!("Sending email with subject: {}", fn_args.subject);

        if fn_args.to.is_empty() {
            return Ok(String::from("Error: at least one recipient (to) is required."));
        }
        if fn_args.subject.trim().is_empty() || fn_args.body.trim().is_empty() {
            return Ok(String::from("Error: a subject and a body are required."));
        }

        let client = match EmailClient::from_config(&self.config, self.policy.clone()) {
            Ok(client) => client,
            Err(e) => return Ok(failure("sending the email", &e)),
        };
        let outgoing = OutgoingMessage {
            to: fn_args.to,
            cc: fn_args.cc.unwrap_or_default(),
            bcc: fn_args.bcc.unwrap_or_default(),
            subject: fn_args.subject,
            body: fn_args.body,
            attachments: fn_args
                .attachments
                .unwrap_or_default()
                .into_iter()
                .map(PathBuf::from)
                .collect(),
        };

        let outcome = client.send_email(&outgoing).await;
        if !outcome.success {
            return Ok(format!(
                "Error: email could not be sent: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            ));
        }
        let attach_info = if outcome.attachment_count > 0 {
            format!(" with {} attachment(s)", outcome.attachment_count)
        } else {
            String::new()
        };
        Ok(format!(
            "Email sent to {} recipient(s){}. Subject: {}",
            outcome.recipient_count(),
            attach_info,
            outcome.subject
        ))
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl SendEmailTool {
    pub fn new(config: &AppConfig) -> Self {
        let function = Function {
            name: String::from("send_email"),
            description: String::from("Send an email over SMTP. The body may be plain text or HTML."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: SendEmailProps {
                    to: Property::string_list("Email addresses of the main recipients."),
                    subject: Property::new("string", "Subject of the email."),
                    body: Property::new("string", "Body of the email, plain text or HTML."),
                    cc: Property::string_list("Email addresses to copy (CC)."),
                    bcc: Property::string_list("Email addresses to blind copy (BCC)."),
                    attachments: Property::string_list("Absolute paths of files to attach."),
                },
                required: vec![
                    String::from("to"),
                    String::from("subject"),
                    String::from("body"),
                ],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            config: config.email.clone(),
            policy: config.retry.email.clone(),
        }
    }
}

/// First characters of the body, converted to markdown when it is HTML.
fn preview(message: &RetrievedMessage) -> String {
    let body = if message.body_is_html {
        let converter = HtmlToMarkdown::builder()
            .skip_tags(vec!["script", "style", "head", "img", "svg"])
            .build();
        converter
            .convert(&message.body)
            .unwrap_or_else(|_| message.body.clone())
    } else {
        message.body.clone()
    };
    let body = body.trim();

    let mut out: String = body.chars().take(PREVIEW_CHARS).collect();
    if body.chars().count() > PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

pub fn render_digest(folder: &str, messages: &[RetrievedMessage]) -> Result<String> {
    let emails: Vec<_> = messages
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "from": or_default(&m.from, "N/A"),
                "to": or_default(&m.to, "N/A"),
                "cc": m.cc,
                "subject": or_default(&m.subject, "(No subject)"),
                "date": or_default(&m.date, "N/A"),
                "attachments": m.attachments.join(", "),
                "preview": preview(m),
            })
        })
        .collect();

    let templates = prompt::templates();
    let content = templates.render(
        &Prompt::EmailDigest.to_string(),
        &json!({"folder": folder, "count": messages.len(), "emails": emails}),
    )?;
    Ok(content.trim().to_string())
}

#[derive(Serialize)]
pub struct RetrieveEmailsProps {
    pub folder: Property,
    pub limit: Property,
    pub unread_only: Property,
    pub search_query: Property,
}

#[derive(Deserialize)]
pub struct RetrieveEmailsArgs {
    pub folder: Option<String>,
    pub limit: Option<usize>,
    pub unread_only: Option<bool>,
    pub search_query: Option<String>,
}

#[derive(Serialize)]
pub struct RetrieveEmailsTool {
    pub r#type: ToolType,
    pub function: Function<RetrieveEmailsProps>,
    #[serde(skip)]
    config: EmailConfig,
    #[serde(skip)]
    policy: RetryPolicy,
}

#[async_trait]
impl ToolCall for RetrieveEmailsTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: RetrieveEmailsArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        let defaults = RetrieveQuery::default();
        let query = RetrieveQuery {
            folder: fn_args.folder.unwrap_or(defaults.folder),
            limit: fn_args.limit.unwrap_or(defaults.limit),
            unread_only: fn_args.unread_only.unwrap_or(defaults.unread_only),
            search: fn_args.search_query,
        };
        tracing::info!(
            "Retrieving up to {} emails from '{}'",
            query.limit,
            query.folder
        );

        let result = match EmailClient::from_config(&self.config, self.policy.clone()) {
            Ok(client) => client.retrieve_emails(&query).await,
            Err(e) => Err(e),
        };
        let messages = match result {
            Ok(messages) => messages,
            Err(e) => return Ok(failure("retrieving emails", &e)),
        };
        if messages.is_empty() {
            return Ok(format!(
                "No emails found in folder '{}' matching the criteria.",
                query.folder
            ));
        }
        match render_digest(&query.folder, &messages) {
            Ok(digest) => Ok(digest),
            Err(e) => Ok(failure("formatting emails", &e)),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl RetrieveEmailsTool {
    pub fn new(config: &AppConfig) -> Self {
        let function = Function {
            name: String::from("retrieve_emails"),
            description: String::from("Retrieve recent emails from a mailbox folder over IMAP."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: RetrieveEmailsProps {
                    folder: Property::new(
                        "string",
                        "IMAP folder to read, e.g. 'INBOX', 'Sent', 'Spam' (default INBOX).",
                    ),
                    limit: Property::new(
                        "integer",
                        "Maximum number of emails to retrieve (default 10).",
                    ),
                    unread_only: Property::new("boolean", "Only retrieve unread emails."),
                    search_query: Property::new(
                        "string",
                        "Extra IMAP search criteria, e.g. 'FROM \"foo@example.com\" SINCE 01-Jan-2024'.",
                    ),
                },
                required: vec![],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            config: config.email.clone(),
            policy: config.retry.email.clone(),
        }
    }
}
