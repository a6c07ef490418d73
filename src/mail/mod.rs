//! Email over SMTP (sending) and IMAP (retrieval).
//!
//! Both protocols are driven by blocking clients (lettre's
//! `SmtpTransport` and the `imap` crate) which run on tokio's blocking
//! pool so the async tool layer never stalls on a mail server.

pub mod imap;
pub mod mime;
pub mod smtp;

pub use imap::RetrieveQuery;
pub use mime::{OutgoingMessage, RetrievedMessage};

use std::sync::Arc;

use anyhow::{Context, Result};
use lettre::message::Mailbox;
use serde::Serialize;

use crate::core::config::EmailConfig;
use crate::core::{RetryPolicy, ServiceError, with_retry};

/// Fully specified mail account settings.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub username: String,
    pub password: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub imap_host: String,
    pub imap_port: u16,
    pub sender_name: Option<String>,
    pub use_tls: bool,
}

impl MailSettings {
    pub fn from_config(config: &EmailConfig) -> Result<Self> {
        match (
            &config.username,
            &config.password,
            &config.smtp_host,
            config.smtp_port,
            &config.imap_host,
            config.imap_port,
        ) {
            (
                Some(username),
                Some(password),
                Some(smtp_host),
                Some(smtp_port),
                Some(imap_host),
                Some(imap_port),
            ) => Ok(Self {
                username: username.clone(),
                password: password.clone(),
                smtp_host: smtp_host.clone(),
                smtp_port,
                imap_host: imap_host.clone(),
                imap_port,
                sender_name: config.sender_name.clone(),
                use_tls: config.use_tls,
            }),
            _ => {
                tracing::error!("Email configuration is incomplete");
                Err(ServiceError::config("Email configuration (SMTP/IMAP) incomplete").into())
            }
        }
    }

    /// `"Name" <username>` when a display name is configured.
    pub fn sender(&self) -> Result<Mailbox> {
        let address = self
            .username
            .parse()
            .with_context(|| format!("Email username '{}' is not an address", self.username))?;
        Ok(Mailbox::new(self.sender_name.clone(), address))
    }
}

/// Result of a send attempt. Failures are reported here instead of
/// being returned as errors.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SendOutcome {
    pub success: bool,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub attachment_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    fn failed(error: String) -> Self {
        tracing::error!("{}", error);
        Self {
            success: false,
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn recipient_count(&self) -> usize {
        self.to.len() + self.cc.len() + self.bcc.len()
    }
}

pub struct EmailClient {
    settings: MailSettings,
    policy: RetryPolicy,
}

impl EmailClient {
    pub fn from_config(config: &EmailConfig, policy: RetryPolicy) -> Result<Self> {
        let settings = MailSettings::from_config(config)?;
        tracing::debug!(
            "Email client for {} (SMTP {}:{}, IMAP {}:{})",
            settings.username,
            settings.smtp_host,
            settings.smtp_port,
            settings.imap_host,
            settings.imap_port
        );
        Ok(Self { settings, policy })
    }

    pub async fn send_email(&self, outgoing: &OutgoingMessage) -> SendOutcome {
        if outgoing.to.is_empty() {
            return SendOutcome::failed(String::from("No recipient specified"));
        }

        let composed = match self
            .settings
            .sender()
            .and_then(|from| mime::compose(&from, outgoing))
        {
            Ok(composed) => composed,
            Err(e) => return SendOutcome::failed(format!("Could not build the email: {:#}", e)),
        };
        let raw = Arc::new(composed.message.formatted());
        let envelope = composed.envelope;

        let result = with_retry(&self.policy, || {
            let settings = self.settings.clone();
            let envelope = envelope.clone();
            let raw = Arc::clone(&raw);
            async move {
                tokio::task::spawn_blocking(move || smtp::submit(&settings, &envelope, &raw))
                    .await
                    .context("SMTP task failed")?
            }
        })
        .await;

        match result {
            Ok(()) => {
                let outcome = SendOutcome {
                    success: true,
                    to: outgoing.to.clone(),
                    cc: outgoing.cc.clone(),
                    bcc: outgoing.bcc.clone(),
                    subject: outgoing.subject.clone(),
                    attachment_count: composed.attachment_count,
                    error: None,
                };
                tracing::info!(
                    "Sent email to {} recipients, subject: {}",
                    outcome.recipient_count(),
                    outcome.subject
                );
                outcome
            }
            Err(e) => match ServiceError::find(&e) {
                Some(ServiceError::Auth(msg)) => SendOutcome::failed(msg.clone()),
                _ => SendOutcome::failed(format!("SMTP error while sending: {:#}", e)),
            },
        }
    }

    pub async fn retrieve_emails(&self, query: &RetrieveQuery) -> Result<Vec<RetrievedMessage>> {
        with_retry(&self.policy, || {
            let settings = self.settings.clone();
            let query = query.clone();
            async move {
                tokio::task::spawn_blocking(move || imap::retrieve(&settings, &query))
                    .await
                    .context("IMAP task failed")?
            }
        })
        .await
    }
}
