//! Errors shared by every service client.
//!
//! Everything propagates as `anyhow::Error`. The variants here are the
//! cases the retry wrapper and the tool layer need to tell apart, so
//! they are attached to the chain and recovered with `downcast_ref`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Missing or incomplete settings. Never retried.
    #[error("{0}")]
    Config(String),

    /// A remote API answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Could not reach the remote end (refused, reset, timed out).
    #[error("connection error: {0}")]
    Connection(String),

    /// Credentials were rejected by the remote end.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The remote end rejected the command at the protocol level (SMTP
    /// or IMAP). `permanent` replies will not succeed on retry.
    #[error("{message}")]
    Protocol { message: String, permanent: bool },
}

impl ServiceError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the first `ServiceError` found in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&ServiceError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ServiceError>())
    }

    pub fn is_config(err: &anyhow::Error) -> bool {
        matches!(Self::find(err), Some(ServiceError::Config(_)))
    }
}

/// Outcome of fetching a single remote entity that may not exist.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }
}

/// Turn a non-success response into `ServiceError::Http`, keeping the
/// response body for the error message.
pub async fn error_for_status(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ServiceError::Http {
        status: status.as_u16(),
        body,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn it_finds_service_error_behind_context() {
        let err: anyhow::Result<()> = Err(ServiceError::config("missing key").into());
        let err = err.context("Building client").unwrap_err();
        assert!(ServiceError::is_config(&err));
    }

    #[test]
    fn it_ignores_unrelated_errors() {
        let err = anyhow::anyhow!("boom");
        assert!(ServiceError::find(&err).is_none());
        assert!(!ServiceError::is_config(&err));
    }

    #[test]
    fn it_formats_http_errors() {
        let err = ServiceError::Http {
            status: 503,
            body: String::from("unavailable"),
        };
        assert_eq!(err.to_string(), "HTTP 503: unavailable");
    }
}
