use std::io::{self, Write};

use anyhow::{Result, anyhow};
use chrono::Utc;

use crate::core::AppConfig;
use crate::google::oauth::{
    CONSOLE_REDIRECT_URI, CredentialBundle, authorization_url, exchange_code_for_token,
    load_client_secrets, scopes_for,
};

/// Console authorization for the calendar. Prints the consent URL,
/// reads the pasted code and writes the token file.
pub async fn run() -> Result<()> {
    let config = AppConfig::default().calendar;
    let secrets = load_client_secrets(&config.credentials_file)?;
    let scopes = scopes_for(config.read_only);
    let auth_url = secrets.auth_uri.clone().unwrap_or(config.auth_url.clone());
    let token_url = secrets.token_uri.clone().unwrap_or(config.token_url.clone());

    let url = authorization_url(&auth_url, &secrets.client_id, CONSOLE_REDIRECT_URI, &scopes);
    println!(
        "\nPlease open the following URL in your browser and authorize access:\n\n{}\n",
        url
    );
    print!("Paste the authorization code shown by Google here: ");
    io::stdout().flush()?;
    let mut code = String::new();
    io::stdin().read_line(&mut code)?;
    let code = code.trim();
    if code.is_empty() {
        return Err(anyhow!("No authorization code entered"));
    }

    let http = reqwest::Client::new();
    let token = exchange_code_for_token(
        &http,
        &token_url,
        &secrets.client_id,
        &secrets.client_secret,
        code,
        CONSOLE_REDIRECT_URI,
    )
    .await?;
    if token.refresh_token.is_none() {
        tracing::warn!("No refresh token in response, re-run auth once the token expires");
    }

    let mut bundle = CredentialBundle {
        token: String::new(),
        refresh_token: None,
        token_uri: token_url,
        client_id: secrets.client_id,
        client_secret: secrets.client_secret,
        scopes,
        expiry: None,
    };
    bundle.apply(token, Utc::now());
    bundle.save(&config.token_file)?;
    println!("Calendar token saved to {}", config.token_file.display());

    Ok(())
}
