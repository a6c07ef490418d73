//! WhatsApp messaging through the Unipile relay API.

pub mod phone;
pub use phone::normalize_phone_number;

use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use serde_json::json;

use crate::core::config::{WhatsAppConfig, mask_secret};
use crate::core::error::error_for_status;
use crate::core::{RetryPolicy, ServiceError, with_retry};

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct Contact {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ContactList {
    #[serde(default)]
    data: Vec<Contact>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NewChat {
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SentMessage {
    pub id: Option<String>,
}

/// Identifier WhatsApp uses for a plain phone number
fn fallback_contact_id(phone: &str) -> String {
    format!("{}@c.us", phone)
}

pub struct WhatsAppClient {
    base_url: String,
    api_key: String,
    policy: RetryPolicy,
    http: reqwest::Client,
}

impl WhatsAppClient {
    /// Fails with a configuration error when the API key or DSN is missing.
    pub fn from_config(config: &WhatsAppConfig, policy: RetryPolicy) -> Result<Self> {
        let (Some(api_key), Some(base_url)) = (config.api_key.clone(), config.base_url()) else {
            tracing::error!("Unipile API key or DSN missing from configuration");
            return Err(ServiceError::config("Unipile configuration incomplete").into());
        };
        tracing::debug!(
            "Unipile client for {} with key {}",
            base_url,
            mask_secret(&api_key)
        );
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            policy,
            http: reqwest::Client::new(),
        })
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .timeout(SEND_TIMEOUT)
    }

    /// Resolve the relay's contact id for a normalized phone number.
    ///
    /// Any lookup failure or an empty result falls back to `<phone>@c.us`
    /// so the send can still be attempted. If the relay stops accepting
    /// that form, the send fails downstream instead of here.
    pub async fn contact_id(&self, account_id: &str, phone: &str) -> String {
        let url = format!("{}/contacts", self.base_url);
        tracing::debug!("Looking up Unipile contact for {}", phone);

        let result = with_retry(&self.policy, || async {
            let resp = self
                .http
                .get(&url)
                .header("X-API-KEY", &self.api_key)
                .header("Accept", "application/json")
                .query(&[("account_id", account_id), ("msisdn", phone)])
                .timeout(LOOKUP_TIMEOUT)
                .send()
                .await?;
            Ok(error_for_status(resp).await?.json::<ContactList>().await?)
        })
        .await;

        match result {
            Ok(list) => match list.data.into_iter().next() {
                Some(contact) => {
                    tracing::debug!("Found Unipile contact {} for {}", contact.id, phone);
                    contact.id
                }
                None => {
                    tracing::warn!("No Unipile contact for {}, using the @c.us form", phone);
                    fallback_contact_id(phone)
                }
            },
            Err(e) => {
                tracing::error!(
                    "Unipile contact lookup for {} failed: {:#}. Using the @c.us form",
                    phone,
                    e
                );
                fallback_contact_id(phone)
            }
        }
    }

    /// Start a chat with `phone` (already normalized) and send `text`.
    pub async fn send_message(&self, account_id: &str, phone: &str, text: &str) -> Result<NewChat> {
        let attendee = self.contact_id(account_id, phone).await;
        let url = format!("{}/chats", self.base_url);
        let payload = json!({
            "account_id": account_id,
            "text": text,
            "attendees_ids": [attendee],
        });
        tracing::debug!("Sending WhatsApp message to {}", attendee);

        with_retry(&self.policy, || async {
            let resp = self.post(&url).json(&payload).send().await?;
            Ok(error_for_status(resp).await?.json::<NewChat>().await?)
        })
        .await
    }

    pub async fn reply_to_chat(&self, chat_id: &str, text: &str) -> Result<SentMessage> {
        let url = format!(
            "{}/chats/{}/messages",
            self.base_url,
            urlencoding::encode(chat_id)
        );
        let payload = json!({ "text": text });
        tracing::debug!("Sending WhatsApp reply to chat {}", chat_id);

        with_retry(&self.policy, || async {
            let resp = self.post(&url).json(&payload).send().await?;
            Ok(error_for_status(resp).await?.json::<SentMessage>().await?)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client(base_url: &str) -> WhatsAppClient {
        let config = WhatsAppConfig {
            api_key: Some("key-123456".to_string()),
            base_url: Some(base_url.to_string()),
            ..Default::default()
        };
        let policy = RetryPolicy::messaging().with_base_delay(Duration::from_millis(1));
        WhatsAppClient::from_config(&config, policy).unwrap()
    }

    #[test]
    fn it_requires_key_and_dsn() {
        let config = WhatsAppConfig {
            unipile_dsn: Some("api.example.com".to_string()),
            ..Default::default()
        };
        let err = WhatsAppClient::from_config(&config, RetryPolicy::messaging())
            .err()
            .unwrap();
        assert!(ServiceError::is_config(&err));
    }

    #[tokio::test]
    async fn it_sends_to_resolved_contact() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("GET", "/contacts")
            .match_header("x-api-key", "key-123456")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("account_id".into(), "acc".into()),
                Matcher::UrlEncoded("msisdn".into(), "33612345678".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data": [{"id": "contact-1"}]}"#)
            .create_async()
            .await;
        let send = server
            .mock("POST", "/chats")
            .match_body(Matcher::Json(json!({
                "account_id": "acc",
                "text": "Hello",
                "attendees_ids": ["contact-1"]
            })))
            .with_status(201)
            .with_body(r#"{"object": "ChatStarted", "chat_id": "chat-9"}"#)
            .create_async()
            .await;

        let chat = client(&server.url())
            .send_message("acc", "33612345678", "Hello")
            .await
            .unwrap();
        lookup.assert_async().await;
        send.assert_async().await;
        assert_eq!(chat.chat_id.as_deref(), Some("chat-9"));
    }

    #[tokio::test]
    async fn it_falls_back_to_plain_number_when_lookup_fails() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/contacts")
            .match_query(Matcher::Any)
            .with_status(400)
            .create_async()
            .await;
        let c = client(&server.url());
        assert_eq!(c.contact_id("acc", "3361").await, "3361@c.us");
    }

    #[tokio::test]
    async fn it_falls_back_to_plain_number_when_no_contact() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/contacts")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;
        let c = client(&server.url());
        assert_eq!(c.contact_id("acc", "3361").await, "3361@c.us");
    }

    #[tokio::test]
    async fn it_does_not_retry_unprocessable_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chats/chat-1/messages")
            .with_status(422)
            .with_body("bad chat")
            .expect(1)
            .create_async()
            .await;

        let err = client(&server.url())
            .reply_to_chat("chat-1", "hi")
            .await
            .unwrap_err();
        mock.assert_async().await;
        assert_eq!(err.to_string(), "HTTP 422: bad chat");
    }

    #[tokio::test]
    async fn it_replies_to_chat() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chats/chat-1/messages")
            .match_body(Matcher::Json(json!({"text": "On my way"})))
            .with_status(201)
            .with_body(r#"{"id": "msg-7"}"#)
            .create_async()
            .await;

        let sent = client(&server.url())
            .reply_to_chat("chat-1", "On my way")
            .await
            .unwrap();
        assert_eq!(sent.id.as_deref(), Some("msg-7"));
    }

    #[tokio::test]
    async fn it_encodes_chat_id_in_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chats/..%2Fadmin%3Fx%3D1%23y/messages")
            .with_status(201)
            .with_body(r#"{"id": "msg-8"}"#)
            .expect(1)
            .create_async()
            .await;

        let sent = client(&server.url())
            .reply_to_chat("../admin?x=1#y", "hi")
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(sent.id.as_deref(), Some("msg-8"));
    }
}
