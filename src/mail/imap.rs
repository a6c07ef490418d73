//! Blocking IMAP retrieval. Run it from `spawn_blocking`.

use anyhow::{Result, anyhow};

use super::MailSettings;
use super::mime::{RetrievedMessage, decode_message};
use crate::core::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveQuery {
    pub folder: String,
    pub limit: usize,
    pub unread_only: bool,
    pub search: Option<String>,
}

impl Default for RetrieveQuery {
    fn default() -> Self {
        Self {
            folder: String::from("INBOX"),
            limit: 10,
            unread_only: false,
            search: None,
        }
    }
}

/// `ALL` when there are no criteria, otherwise the criteria ANDed inside
/// parentheses.
pub fn search_expression(unread_only: bool, search: Option<&str>) -> String {
    let mut criteria = vec![];
    if unread_only {
        criteria.push("UNSEEN");
    }
    if let Some(search) = search.map(str::trim).filter(|s| !s.is_empty()) {
        criteria.push(search);
    }
    if criteria.is_empty() {
        String::from("ALL")
    } else {
        format!("({})", criteria.join(" "))
    }
}

/// Most recent first, truncated to `limit`, so only the messages that
/// will be returned get fetched.
pub fn newest_first(ids: impl IntoIterator<Item = u32>, limit: usize) -> Vec<u32> {
    let mut ids: Vec<u32> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.reverse();
    ids.truncate(limit);
    ids
}

fn imap_error(err: imap::error::Error) -> anyhow::Error {
    match err {
        imap::error::Error::Io(e) => ServiceError::Connection(e.to_string()).into(),
        imap::error::Error::ConnectionLost => {
            ServiceError::Connection(String::from("IMAP connection lost")).into()
        }
        other => anyhow!("IMAP error: {}", other),
    }
}

pub fn retrieve(settings: &MailSettings, query: &RetrieveQuery) -> Result<Vec<RetrievedMessage>> {
    tracing::debug!(
        "Connecting to IMAP {}:{} as {}",
        settings.imap_host,
        settings.imap_port,
        settings.username
    );
    let tls = native_tls::TlsConnector::builder().build()?;
    let client = imap::connect(
        (settings.imap_host.as_str(), settings.imap_port),
        &settings.imap_host,
        &tls,
    )
    .map_err(imap_error)?;
    let mut session = client
        .login(&settings.username, &settings.password)
        .map_err(|(e, _)| {
            ServiceError::Auth(format!("IMAP login failed for {}: {}", settings.username, e))
        })?;

    let messages = read_folder(&mut session, query);

    if let Err(e) = session.logout() {
        tracing::debug!("IMAP logout failed: {}", e);
    }
    tracing::info!(
        "Retrieved {} emails from '{}' for {}",
        messages.len(),
        query.folder,
        settings.username
    );
    Ok(messages)
}

/// Folder and search failures yield an empty list. A message that fails
/// to fetch or decode is skipped.
fn read_folder<T: std::io::Read + std::io::Write>(
    session: &mut imap::Session<T>,
    query: &RetrieveQuery,
) -> Vec<RetrievedMessage> {
    if let Err(e) = session.examine(&query.folder) {
        tracing::error!("IMAP folder '{}' not available: {}", query.folder, e);
        return vec![];
    }

    let expression = search_expression(query.unread_only, query.search.as_deref());
    tracing::debug!("IMAP search: {}", expression);
    let ids = match session.search(&expression) {
        Ok(ids) => ids,
        Err(e) => {
            tracing::error!("IMAP search '{}' failed: {}", expression, e);
            return vec![];
        }
    };

    let mut messages = vec![];
    for id in newest_first(ids, query.limit) {
        let id = id.to_string();
        let fetches = match session.fetch(&id, "RFC822") {
            Ok(fetches) => fetches,
            Err(e) => {
                tracing::warn!("Could not fetch email {}: {}", id, e);
                continue;
            }
        };
        let Some(raw) = fetches.iter().find_map(|f| f.body()) else {
            tracing::warn!("Email {} has no body", id);
            continue;
        };
        match decode_message(&id, raw) {
            Ok(message) => messages.push(message),
            Err(e) => tracing::error!("Could not process email {}: {:#}", id, e),
        }
    }
    messages
}
