//! Bounded retry with exponential backoff for calls to remote services.
//!
//! Every service client wraps its remote calls in [`with_retry`]. The
//! only thing that varies between call sites is the [`RetryPolicy`]:
//! how many retries, the base delay, and which HTTP status codes are
//! terminal for that integration.
//!
//! Failures are classified into three buckets:
//! - [`Verdict::Fail`]: returned immediately without sleeping (terminal
//!   HTTP status, configuration or authentication errors, permanent
//!   protocol replies)
//! - [`Verdict::Backoff`]: any other HTTP status or a connection/timeout
//!   error, retried after `base_delay * 2^(attempt - 1)`
//! - [`Verdict::Retry`]: anything else, retried after `base_delay`

use std::future::Future;
use std::io;
use std::time::Duration;

use anyhow::Result;

use super::error::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Name of the call site, used in log lines.
    pub site: &'static str,
    pub max_retries: u32,
    pub base_delay: Duration,
    /// HTTP status codes that will never succeed on retry.
    pub non_retryable: Vec<u16>,
}

impl RetryPolicy {
    pub fn calendar() -> Self {
        Self {
            site: "calendar",
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            non_retryable: vec![400, 401, 403, 404],
        }
    }

    pub fn messaging() -> Self {
        Self {
            site: "messaging",
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            non_retryable: vec![400, 401, 403, 422],
        }
    }

    pub fn email() -> Self {
        Self {
            site: "email",
            max_retries: 2,
            base_delay: Duration::from_secs(2),
            ..Self::messaging()
        }
    }

    pub fn transcript() -> Self {
        Self {
            site: "transcript",
            ..Self::messaging()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, verdict: Verdict, attempt: u32) -> Duration {
        match verdict {
            Verdict::Backoff => self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1)),
            _ => self.base_delay,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fail,
    Backoff,
    Retry,
}

fn status_verdict(status: u16, non_retryable: &[u16]) -> Verdict {
    if non_retryable.contains(&status) {
        Verdict::Fail
    } else {
        Verdict::Backoff
    }
}

fn is_connection_io(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
    )
}

/// Decide what to do with a failed attempt. The first recognised error
/// in the chain wins.
pub fn classify(err: &anyhow::Error, non_retryable: &[u16]) -> Verdict {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ServiceError>() {
            return match e {
                ServiceError::Config(_) | ServiceError::Auth(_) => Verdict::Fail,
                ServiceError::Http { status, .. } => status_verdict(*status, non_retryable),
                ServiceError::Connection(_) => Verdict::Backoff,
                ServiceError::Protocol {
                    permanent: true, ..
                } => Verdict::Fail,
                ServiceError::Protocol { .. } => Verdict::Retry,
            };
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if let Some(status) = e.status() {
                return status_verdict(status.as_u16(), non_retryable);
            }
            if e.is_connect() || e.is_timeout() || e.is_request() {
                return Verdict::Backoff;
            }
            return Verdict::Retry;
        }
        if let Some(e) = cause.downcast_ref::<io::Error>()
            && is_connection_io(e)
        {
            return Verdict::Backoff;
        }
    }
    Verdict::Retry
}

/// Run `operation` under `policy`, sleeping with `tokio::time::sleep`
/// between attempts.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_using(policy, operation, tokio::time::sleep).await
}

/// Same as [`with_retry`] but with an explicit sleep function.
///
/// The last error is returned once `max_retries` retries have been
/// used up. Nothing is synthesized in its place.
pub async fn with_retry_using<T, F, Fut, S, SFut>(
    policy: &RetryPolicy,
    mut operation: F,
    mut sleep: S,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut retries: u32 = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(site = policy.site, retries, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let verdict = classify(&err, &policy.non_retryable);
        if verdict == Verdict::Fail {
            tracing::error!(site = policy.site, "Non-retryable error: {:#}", err);
            return Err(err);
        }

        retries += 1;
        if retries > policy.max_retries {
            tracing::error!(
                site = policy.site,
                "Failed after {} retries: {:#}",
                policy.max_retries,
                err
            );
            return Err(err);
        }

        let delay = policy.delay_for(verdict, retries);
        tracing::warn!(
            site = policy.site,
            "Attempt {}/{} failed, retrying in {:?}: {:#}",
            retries,
            policy.max_retries,
            delay,
            err
        );
        sleep(delay).await;
    }
}
