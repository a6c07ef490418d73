//! OAuth credentials for the Google Calendar API.
//!
//! The token bundle lives in a JSON file next to the client secrets
//! downloaded from the Google Cloud console. It is created once by the
//! console authorization flow (`errand auth`) and refreshed in place
//! whenever the access token expires.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::ServiceError;
use crate::core::config::CalendarConfig;
use crate::core::error::error_for_status;

pub const SCOPES_READ_ONLY: &[&str] = &["https://www.googleapis.com/auth/calendar.readonly"];
pub const SCOPES_FULL_ACCESS: &[&str] = &["https://www.googleapis.com/auth/calendar"];

/// Redirect URI for the copy/paste console flow
pub const CONSOLE_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

pub fn scopes_for(read_only: bool) -> Vec<String> {
    let scopes = if read_only {
        SCOPES_READ_ONLY
    } else {
        SCOPES_FULL_ACCESS
    };
    scopes.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CredentialBundle {
    pub token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialBundle {
    /// Treat tokens about to expire within a minute as already expired
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .map(|expiry| expiry <= now + Duration::seconds(60))
            .unwrap_or(false)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Reading token file {}", path.display()))?;
        let bundle = serde_json::from_str(&raw)
            .with_context(|| format!("Parsing token file {}", path.display()))?;
        Ok(bundle)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir)?;
            tracing::info!("Created token directory {}", dir.display());
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!("Saved token to {}", path.display());
        Ok(())
    }

    /// Fold a token endpoint response into the bundle. Google omits the
    /// refresh token on refresh so the existing one is kept.
    pub fn apply(&mut self, token: TokenResponse, now: DateTime<Utc>) {
        self.token = token.access_token;
        self.expiry = token.expires_in.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = token.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        if let Some(scope) = token.scope {
            self.scopes = scope.split_whitespace().map(String::from).collect();
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: Option<String>,
    pub token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// Read the client secrets JSON (either the `installed` or `web` flavor)
pub fn load_client_secrets(path: &Path) -> Result<ClientSecret> {
    if !path.exists() {
        return Err(ServiceError::config(format!(
            "Calendar client secrets not found. Place the OAuth client JSON at {}",
            path.display()
        ))
        .into());
    }
    let raw = fs::read_to_string(path)?;
    let file: ClientSecretsFile = serde_json::from_str(&raw)
        .with_context(|| format!("Parsing client secrets {}", path.display()))?;
    file.installed
        .or(file.web)
        .ok_or(anyhow!("Client secrets file has no 'installed' or 'web' section"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: Option<i64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

pub fn authorization_url(
    auth_url: &str,
    client_id: &str,
    redirect_uri: &str,
    scopes: &[String],
) -> String {
    format!(
        "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
        auth_url,
        urlencoding::encode(client_id),
        urlencoding::encode(redirect_uri),
        urlencoding::encode(&scopes.join(" "))
    )
}

pub async fn exchange_code_for_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    let resp = http
        .post(token_url)
        .form(&[
            ("code", code),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;
    let token = error_for_status(resp).await?.json().await?;
    Ok(token)
}

pub async fn refresh_access_token(
    http: &reqwest::Client,
    token_url: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    let resp = http
        .post(token_url)
        .form(&[
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;
    let token = error_for_status(resp).await?.json().await?;
    Ok(token)
}

/// Lazily loaded, process-wide calendar credentials.
///
/// The bundle is read from disk only when nothing usable is cached and
/// is written back to the same file after every refresh.
pub struct CredentialStore {
    token_path: PathBuf,
    http: reqwest::Client,
    cached: Mutex<Option<CredentialBundle>>,
}

impl CredentialStore {
    pub fn new(config: &CalendarConfig, http: reqwest::Client) -> Self {
        Self {
            token_path: config.token_file.clone(),
            http,
            cached: Mutex::new(None),
        }
    }

    fn load_from_disk(&self) -> Option<CredentialBundle> {
        if !self.token_path.exists() {
            return None;
        }
        match CredentialBundle::load(&self.token_path) {
            Ok(bundle) => {
                tracing::debug!("Loaded calendar token from file");
                Some(bundle)
            }
            Err(e) => {
                tracing::error!("{:#}", e);
                None
            }
        }
    }

    /// Return a valid access token, refreshing it if needed.
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(bundle) = cached.as_ref()
            && !bundle.is_expired(now)
        {
            return Ok(bundle.token.clone());
        }

        let mut bundle = match cached.take().or_else(|| self.load_from_disk()) {
            Some(bundle) => bundle,
            None => {
                return Err(ServiceError::config(format!(
                    "No calendar authorization found at {}. Run `errand auth` first.",
                    self.token_path.display()
                ))
                .into());
            }
        };

        if bundle.is_expired(now) {
            let refresh_token = bundle.refresh_token.clone().ok_or_else(|| {
                ServiceError::config(
                    "Calendar token expired and has no refresh token. Run `errand auth` again.",
                )
            })?;
            let token = refresh_access_token(
                &self.http,
                &bundle.token_uri,
                &bundle.client_id,
                &bundle.client_secret,
                &refresh_token,
            )
            .await
            .context("Refreshing calendar token")?;
            bundle.apply(token, now);
            tracing::debug!("Refreshed calendar token");

            if let Err(e) = bundle.save(&self.token_path) {
                tracing::warn!(
                    "Unable to save token to {}: {:#}",
                    self.token_path.display(),
                    e
                );
            }
        }

        let token = bundle.token.clone();
        *cached = Some(bundle);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn calendar_config(token_file: PathBuf) -> CalendarConfig {
        CalendarConfig {
            calendar_id: "primary".to_string(),
            timezone: "Europe/Paris".to_string(),
            token_file,
            credentials_file: PathBuf::from("missing.json"),
            read_only: false,
            api_base_url: "http://localhost".to_string(),
            auth_url: "http://localhost/auth".to_string(),
            token_url: "http://localhost/token".to_string(),
        }
    }

    fn bundle(token_uri: &str, expiry: Option<DateTime<Utc>>) -> CredentialBundle {
        CredentialBundle {
            token: "old-token".to_string(),
            refresh_token: Some("refresh-me".to_string()),
            token_uri: token_uri.to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: scopes_for(false),
            expiry,
        }
    }

    #[test]
    fn it_builds_authorization_url() {
        let url = authorization_url(
            "https://accounts.example.com/auth",
            "abc",
            CONSOLE_REDIRECT_URI,
            &scopes_for(true),
        );
        assert!(url.starts_with("https://accounts.example.com/auth?client_id=abc&"));
        assert!(url.contains("redirect_uri=urn%3Aietf%3Awg%3Aoauth%3A2.0%3Aoob"));
        assert!(url.contains("calendar.readonly"));
        assert!(url.contains("access_type=offline"));
    }

    #[test]
    fn it_treats_near_expiry_as_expired() {
        let now = Utc::now();
        assert!(bundle("x", Some(now + Duration::seconds(30))).is_expired(now));
        assert!(!bundle("x", Some(now + Duration::hours(1))).is_expired(now));
        assert!(!bundle("x", None).is_expired(now));
    }

    #[tokio::test]
    async fn it_reports_missing_authorization_as_config_error() {
        let dir = tempdir().unwrap();
        let store = CredentialStore::new(
            &calendar_config(dir.path().join("token.json")),
            reqwest::Client::new(),
        );
        let err = store.access_token().await.unwrap_err();
        assert!(ServiceError::is_config(&err));
    }

    #[tokio::test]
    async fn it_uses_valid_token_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("token.json");
        bundle("http://unused", Some(Utc::now() + Duration::hours(1)))
            .save(&path)
            .unwrap();

        let store = CredentialStore::new(&calendar_config(path), reqwest::Client::new());
        assert_eq!(store.access_token().await.unwrap(), "old-token");
    }

    #[tokio::test]
    async fn it_refreshes_and_persists_expired_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/token")
            .match_body(mockito::Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "new-token", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        // Nested directory is created on save
        let path = dir.path().join("creds").join("token.json");
        let token_uri = format!("{}/token", server.url());
        bundle(&token_uri, Some(Utc::now() - Duration::hours(1)))
            .save(&path)
            .unwrap();

        let store = CredentialStore::new(&calendar_config(path.clone()), reqwest::Client::new());
        assert_eq!(store.access_token().await.unwrap(), "new-token");
        // Second call is served from memory
        assert_eq!(store.access_token().await.unwrap(), "new-token");
        mock.assert_async().await;

        let saved = CredentialBundle::load(&path).unwrap();
        assert_eq!(saved.token, "new-token");
        assert_eq!(saved.refresh_token.as_deref(), Some("refresh-me"));
        assert!(!saved.is_expired(Utc::now()));
    }

    #[test]
    fn it_loads_installed_client_secrets() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("client.json");
        fs::write(
            &path,
            r#"{"installed": {"client_id": "id", "client_secret": "shh", "token_uri": "https://oauth2.googleapis.com/token"}}"#,
        )
        .unwrap();
        let secret = load_client_secrets(&path).unwrap();
        assert_eq!(secret.client_id, "id");
        assert_eq!(secret.client_secret, "shh");

        let err = load_client_secrets(&dir.path().join("nope.json")).unwrap_err();
        assert!(ServiceError::is_config(&err));
    }
}
