use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{failure, parse_args};
use crate::core::config::WhatsAppConfig;
use crate::core::{AppConfig, RetryPolicy};
use crate::openai::{Function, Parameters, Property, ToolCall, ToolType};
use crate::whatsapp::{WhatsAppClient, normalize_phone_number};

const MIN_PHONE_DIGITS: usize = 8;

#[derive(Serialize)]
pub struct SendWhatsAppProps {
    pub phone_number: Property,
    pub message: Property,
    pub account_id: Property,
}

#[derive(Deserialize)]
pub struct SendWhatsAppArgs {
    pub phone_number: String,
    pub message: String,
    pub account_id: Option<String>,
}

#[derive(Serialize)]
pub struct SendWhatsAppMessageTool {
    pub r#type: ToolType,
    pub function: Function<SendWhatsAppProps>,
    #[serde(skip)]
    config: WhatsAppConfig,
    #[serde(skip)]
    policy: RetryPolicy,
}

#[async_trait]
impl ToolCall for SendWhatsAppMessageTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: SendWhatsAppArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        tracing::info!("Sending WhatsApp message to {}", fn_args.phone_number);

        let Some(account_id) = fn_args
            .account_id
            .clone()
            .filter(|a| !a.is_empty())
            .or_else(|| self.config.account_id.clone())
        else {
            return Ok(String::from(
                "Error: no WhatsApp account ID configured or provided.",
            ));
        };
        if fn_args.phone_number.trim().is_empty() || fn_args.message.trim().is_empty() {
            return Ok(String::from(
                "Error: a phone number and a message are required.",
            ));
        }

        let phone = normalize_phone_number(&fn_args.phone_number);
        if phone.len() < MIN_PHONE_DIGITS {
            return Ok(format!(
                "Error: phone number '{}' is invalid after normalization: '{}'.",
                fn_args.phone_number, phone
            ));
        }

        let result = match WhatsAppClient::from_config(&self.config, self.policy.clone()) {
            Ok(client) => client.send_message(&account_id, &phone, &fn_args.message).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(chat) => match chat.chat_id {
                Some(chat_id) => Ok(format!(
                    "WhatsApp message sent to {}. Chat ID: {}",
                    phone, chat_id
                )),
                None => Ok(String::from("WhatsApp message sent, but no chat ID was returned.")),
            },
            Err(e) => Ok(failure("sending the WhatsApp message", &e)),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl SendWhatsAppMessageTool {
    pub fn new(config: &AppConfig) -> Self {
        let function = Function {
            name: String::from("send_whatsapp_message"),
            description: String::from("Send a WhatsApp message to a phone number."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: SendWhatsAppProps {
                    phone_number: Property::new(
                        "string",
                        "Recipient phone number, international format recommended.",
                    ),
                    message: Property::new("string", "Text of the message."),
                    account_id: Property::new(
                        "string",
                        "WhatsApp account ID to send from (defaults to the configured account).",
                    ),
                },
                required: vec![String::from("phone_number"), String::from("message")],
                additional_properties: false,
            },
            strict: false,
        };
        Self {
            r#type: ToolType::Function,
            function,
            config: config.whatsapp.clone(),
            policy: config.retry.messaging.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct ReplyWhatsAppProps {
    pub chat_id: Property,
    pub message: Property,
}

#[derive(Deserialize)]
pub struct ReplyWhatsAppArgs {
    pub chat_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ReplyWhatsAppChatTool {
    pub r#type: ToolType,
    pub function: Function<ReplyWhatsAppProps>,
    #[serde(skip)]
    config: WhatsAppConfig,
    #[serde(skip)]
    policy: RetryPolicy,
}

#[async_trait]
impl ToolCall for ReplyWhatsAppChatTool {
    async fn call(&self, args: &str) -> Result<String, Error> {
        let fn_args: ReplyWhatsAppArgs = match parse_args(args) {
            Ok(a) => a,
            Err(msg) => return Ok(msg),
        };
        tracing::info!("Replying to WhatsApp chat {}", fn_args.chat_id);

        if self.config.account_id.is_none() {
            return Ok(String::from(
                "Error: no default WhatsApp account ID configured.",
            ));
        }
        if fn_args.chat_id.trim().is_empty() || fn_args.message.trim().is_empty() {
            return Ok(String::from("Error: a chat ID and a message are required."));
        }

        let result = match WhatsAppClient::from_config(&self.config, self.policy.clone()) {
            Ok(client) => client.reply_to_chat(&fn_args.chat_id, &fn_args.message).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(sent) => match sent.id {
                Some(id) => Ok(format!(
                    "Reply sent to WhatsApp chat {}. Message ID: {}",
                    fn_args.chat_id, id
                )),
                None => Ok(String::from("WhatsApp reply sent, but no message ID was returned.")),
            },
            Err(e) => Ok(failure("replying to the WhatsApp chat", &e)),
        }
    }

    fn function_name(&self) -> String {
        self.function.name.clone()
    }
}

impl ReplyWhatsAppChatTool {
    pub fn new(config: &AppConfig) -> Self {
        let function = Function {
            name: String::from("reply_whatsapp_chat"),
            description: String::from("Reply in an existing WhatsApp chat."),
            parameters: Parameters {
                r#type: String::from("object"),
                properties: ReplyWhatsAppProps {
                    chat_id: Property::new("string", "ID of the WhatsApp chat to reply to."),
                    message: Property::new("string", "Text of the reply."),
                },
                required: vec![String::from("chat_id"), String::from("message")],
                additional_properties: false,
            },
            strict: true,
        };
        Self {
            r#type: ToolType::Function,
            function,
            config: config.whatsapp.clone(),
            policy: config.retry.messaging.clone(),
        }
    }
}
