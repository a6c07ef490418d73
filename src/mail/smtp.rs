//! Blocking SMTP submission. Run it from `spawn_blocking`.

use std::time::Duration;

use anyhow::Result;
use lettre::address::Envelope;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{SmtpTransport, Transport};

use super::MailSettings;
use crate::core::ServiceError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);
const IMPLICIT_TLS_PORT: u16 = 465;

/// Implicit TLS on 465, otherwise plain with an optional STARTTLS upgrade.
fn transport(settings: &MailSettings) -> Result<SmtpTransport> {
    let builder = if settings.smtp_port == IMPLICIT_TLS_PORT {
        SmtpTransport::relay(&settings.smtp_host)?
    } else if settings.use_tls {
        SmtpTransport::starttls_relay(&settings.smtp_host)?
    } else {
        SmtpTransport::builder_dangerous(&settings.smtp_host)
    };

    Ok(builder
        .port(settings.smtp_port)
        .credentials(Credentials::new(
            settings.username.clone(),
            settings.password.clone(),
        ))
        .timeout(Some(SMTP_TIMEOUT))
        .build())
}

/// Map a lettre failure onto the shared error taxonomy. 53x replies are
/// authentication failures.
fn classify(err: lettre::transport::smtp::Error, username: &str) -> anyhow::Error {
    let code = err.status().map(|code| code.to_string());
    if code.as_deref().is_some_and(|c| c.starts_with("53")) {
        return ServiceError::Auth(format!("SMTP authentication failed for {}: {}", username, err))
            .into();
    }
    if err.is_permanent() {
        return ServiceError::Protocol {
            message: format!("SMTP rejected the message: {}", err),
            permanent: true,
        }
        .into();
    }
    if err.is_transient() {
        return ServiceError::Protocol {
            message: format!("SMTP temporary failure: {}", err),
            permanent: false,
        }
        .into();
    }
    ServiceError::Connection(format!(
        "SMTP error talking to the server: {}",
        err
    ))
    .into()
}

pub fn submit(settings: &MailSettings, envelope: &Envelope, message: &[u8]) -> Result<()> {
    tracing::debug!(
        "Connecting to SMTP {}:{}",
        settings.smtp_host,
        settings.smtp_port
    );
    let transport = transport(settings)?;
    transport
        .send_raw(envelope, message)
        .map_err(|e| classify(e, &settings.username))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::{Verdict, classify as retry_verdict};

    fn settings(port: u16, use_tls: bool) -> MailSettings {
        MailSettings {
            username: "bot@example.com".to_string(),
            password: "hunter2".to_string(),
            smtp_host: "127.0.0.1".to_string(),
            smtp_port: port,
            imap_host: "127.0.0.1".to_string(),
            imap_port: 993,
            sender_name: None,
            use_tls,
        }
    }

    #[test]
    fn it_builds_transport_for_each_mode() {
        assert!(transport(&settings(465, true)).is_ok());
        assert!(transport(&settings(587, true)).is_ok());
        assert!(transport(&settings(25, false)).is_ok());
    }

    #[test]
    fn it_reports_unreachable_server_as_retryable() {
        // Nothing listens on port 1
        let envelope = Envelope::new(
            Some("bot@example.com".parse().unwrap()),
            vec!["alice@example.com".parse().unwrap()],
        )
        .unwrap();
        let err = submit(&settings(1, false), &envelope, b"Subject: hi\r\n\r\nhi").unwrap_err();
        assert_ne!(
            retry_verdict(&err, &crate::core::RetryPolicy::email().non_retryable),
            Verdict::Fail
        );
    }
}
