use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::retry::RetryPolicy;

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub calendar_id: String,
    pub timezone: String,
    pub token_file: PathBuf,
    pub credentials_file: PathBuf,
    pub read_only: bool,
    pub api_base_url: String,
    pub auth_url: String,
    pub token_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct WhatsAppConfig {
    pub unipile_dsn: Option<String>,
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    /// Overrides `https://{dsn}/api/v1`, mostly useful for tests
    pub base_url: Option<String>,
}

impl WhatsAppConfig {
    pub fn base_url(&self) -> Option<String> {
        self.base_url.clone().or_else(|| {
            self.unipile_dsn
                .as_ref()
                .map(|dsn| format!("https://{}/api/v1", dsn))
        })
    }
}

#[derive(Clone, Debug, Default)]
pub struct EmailConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub imap_host: Option<String>,
    pub imap_port: Option<u16>,
    pub sender_name: Option<String>,
    pub use_tls: bool,
}

#[derive(Clone, Debug)]
pub struct TranscriptConfig {
    pub rapid_api_key: Option<String>,
    pub rapid_api_host: String,
    pub base_url: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RetrySettings {
    pub calendar: RetryPolicy,
    pub messaging: RetryPolicy,
    pub email: RetryPolicy,
    pub transcript: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            calendar: RetryPolicy::calendar(),
            messaging: RetryPolicy::messaging(),
            email: RetryPolicy::email(),
            transcript: RetryPolicy::transcript(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub calendar: CalendarConfig,
    pub whatsapp: WhatsAppConfig,
    pub email: EmailConfig,
    pub transcript: TranscriptConfig,
    pub retry: RetrySettings,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparseable value for {}: {}", key, raw);
            None
        }
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env_opt(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Apply `ERRAND_<SITE>_MAX_RETRIES` and `ERRAND_<SITE>_RETRY_DELAY_MS`
fn retry_from_env(site: &str, policy: RetryPolicy) -> RetryPolicy {
    let mut policy = policy;
    if let Some(n) = env_parse::<u32>(&format!("ERRAND_{}_MAX_RETRIES", site)) {
        policy = policy.with_max_retries(n);
    }
    if let Some(ms) = env_parse::<u64>(&format!("ERRAND_{}_RETRY_DELAY_MS", site)) {
        policy = policy.with_base_delay(Duration::from_millis(ms));
    }
    policy
}

impl AppConfig {
    /// Read every section from `ERRAND_*` environment variables. Nothing
    /// is validated here, missing credentials are reported by the client
    /// that needs them.
    pub fn from_env() -> Self {
        let storage_path =
            PathBuf::from(env::var("ERRAND_STORAGE_PATH").unwrap_or("./".to_string()));
        let token_file = storage_path.join(
            env::var("ERRAND_CALENDAR_TOKEN_FILE")
                .unwrap_or("credentials/calendar_token.json".to_string()),
        );
        let credentials_file = storage_path.join(
            env::var("ERRAND_CALENDAR_CREDENTIALS_FILE")
                .unwrap_or("credentials/calendar_credentials.json".to_string()),
        );

        let calendar = CalendarConfig {
            calendar_id: env_opt("ERRAND_CALENDAR_ID").unwrap_or("primary".to_string()),
            timezone: env_opt("ERRAND_CALENDAR_TIMEZONE").unwrap_or("Europe/Paris".to_string()),
            token_file,
            credentials_file,
            read_only: env_flag("ERRAND_CALENDAR_READ_ONLY", false),
            api_base_url: env_opt("ERRAND_CALENDAR_API_URL")
                .unwrap_or("https://www.googleapis.com/calendar/v3".to_string()),
            auth_url: env_opt("ERRAND_OAUTH_AUTH_URL")
                .unwrap_or("https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_url: env_opt("ERRAND_OAUTH_TOKEN_URL")
                .unwrap_or("https://oauth2.googleapis.com/token".to_string()),
        };

        let whatsapp = WhatsAppConfig {
            unipile_dsn: env_opt("ERRAND_UNIPILE_DSN"),
            api_key: env_opt("ERRAND_UNIPILE_API_KEY"),
            account_id: env_opt("ERRAND_WHATSAPP_ACCOUNT_ID"),
            base_url: env_opt("ERRAND_UNIPILE_BASE_URL"),
        };

        let email = EmailConfig {
            username: env_opt("ERRAND_EMAIL_USERNAME"),
            password: env_opt("ERRAND_EMAIL_PASSWORD"),
            smtp_host: env_opt("ERRAND_SMTP_HOST"),
            smtp_port: env_parse("ERRAND_SMTP_PORT"),
            imap_host: env_opt("ERRAND_IMAP_HOST"),
            imap_port: env_parse("ERRAND_IMAP_PORT"),
            sender_name: env_opt("ERRAND_EMAIL_SENDER_NAME"),
            use_tls: env_flag("ERRAND_SMTP_STARTTLS", true),
        };

        let rapid_api_host =
            env_opt("ERRAND_RAPIDAPI_HOST").unwrap_or("youtube-v2.p.rapidapi.com".to_string());
        let transcript = TranscriptConfig {
            rapid_api_key: env_opt("ERRAND_RAPIDAPI_KEY"),
            base_url: env_opt("ERRAND_TRANSCRIPT_API_URL")
                .unwrap_or(format!("https://{}", rapid_api_host)),
            rapid_api_host,
        };

        let retry = RetrySettings {
            calendar: retry_from_env("CALENDAR", RetryPolicy::calendar()),
            messaging: retry_from_env("MESSAGING", RetryPolicy::messaging()),
            email: retry_from_env("EMAIL", RetryPolicy::email()),
            transcript: retry_from_env("TRANSCRIPT", RetryPolicy::transcript()),
        };

        Self {
            calendar,
            whatsapp,
            email,
            transcript,
            retry,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Hide all but the last four characters of a secret for log output.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), tail)
}
