//! Mailbox provider glue: deep links and OAuth token exchange.
//!
//! Link building is pure string formatting against each provider's web URL
//! template. Token exchange is a single form POST per provider; the browser
//! consent dance itself lives with the caller.

use serde::Deserialize;

use crate::config::OAuthApp;
use crate::db::EmailSource;
use crate::error::AppError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";

/// Deep link to view a message in the provider's web UI.
pub fn message_link(source: EmailSource, message_id: &str) -> String {
    match source {
        EmailSource::Gmail => format!("https://mail.google.com/mail/u/0/#inbox/{}", message_id),
        EmailSource::Outlook => format!("https://outlook.office.com/mail/inbox/id/{}", message_id),
    }
}

/// Tokens returned by a provider's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// OAuth token client for one mailbox provider.
pub struct MailOAuth {
    client: reqwest::Client,
    token_url: String,
    app: OAuthApp,
    redirect_uri: String,
}

impl MailOAuth {
    pub fn new(source: EmailSource, app: OAuthApp, redirect_uri: &str) -> Self {
        let token_url = match source {
            EmailSource::Gmail => GOOGLE_TOKEN_URL,
            EmailSource::Outlook => MICROSOFT_TOKEN_URL,
        };
        Self::with_token_url(token_url, app, redirect_uri)
    }

    /// Point the token exchange at a different endpoint. Used by tests.
    pub fn with_token_url(token_url: &str, app: OAuthApp, redirect_uri: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.to_string(),
            app,
            redirect_uri: redirect_uri.to_string(),
        }
    }

    pub async fn exchange_code_for_token(&self, code: &str) -> Result<ProviderTokens, AppError> {
        self.token_request(&[
            ("code", code),
            ("client_id", &self.app.client_id),
            ("client_secret", &self.app.client_secret),
            ("redirect_uri", &self.redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<ProviderTokens, AppError> {
        self.token_request(&[
            ("refresh_token", refresh_token),
            ("client_id", &self.app.client_id),
            ("client_secret", &self.app.client_secret),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<ProviderTokens, AppError> {
        let resp = self
            .client
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AppError::Email(format!("token request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::Auth(format!(
                "Mailbox token request failed ({}): {}",
                status, body
            )));
        }

        resp.json()
            .await
            .map_err(|e| AppError::Email(format!("token response did not parse: {}", e)))
    }
}
