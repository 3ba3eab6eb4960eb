//! TickTick OAuth2 token glue.
//!
//! The browser consent dance lives with the caller; this module only builds
//! the authorization URL and exchanges/refreshes tokens.

use url::Url;

use super::{TaskServiceError, TokenResponse};

const TICKTICK_AUTH_URL: &str = "https://ticktick.com/oauth/authorize";
const TICKTICK_TOKEN_URL: &str = "https://ticktick.com/oauth/token";
const SCOPE: &str = "tasks:read tasks:write";

pub struct TickTickOAuth {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    token_url: String,
}

impl TickTickOAuth {
    pub fn new(client_id: &str, client_secret: &str, redirect_uri: &str) -> Self {
        Self::with_token_url(TICKTICK_TOKEN_URL, client_id, client_secret, redirect_uri)
    }

    /// Point the token exchange at a different endpoint. Used by tests.
    pub fn with_token_url(
        token_url: &str,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: redirect_uri.to_string(),
            token_url: token_url.to_string(),
        }
    }

    /// The URL the user visits to grant access.
    pub fn authorize_url(&self, state: &str) -> String {
        let url = Url::parse_with_params(
            TICKTICK_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPE),
                ("state", state),
            ],
        )
        .expect("static authorize URL is valid");
        url.into()
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<TokenResponse, TaskServiceError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", SCOPE),
        ])
        .await
    }

    /// Refresh an expired access token.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenResponse, TaskServiceError> {
        self.token_request(&[
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, TaskServiceError> {
        let resp = self.client.post(&self.token_url).form(form).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TaskServiceError::Auth(format!(
                "Token request failed ({}): {}",
                status, body
            )));
        }

        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_authorize_url_contains_params() {
        let oauth = TickTickOAuth::new("cid", "secret", "http://localhost:8000/callback");
        let url = oauth.authorize_url("focusdeck");
        assert!(url.starts_with("https://ticktick.com/oauth/authorize?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("state=focusdeck"));
        assert!(url.contains("scope=tasks%3Aread+tasks%3Awrite"));
    }

    #[tokio::test]
    async fn test_exchange_code_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "at-1", "refresh_token": "rt-1", "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let oauth = TickTickOAuth::with_token_url(
            &format!("{}/oauth/token", server.uri()),
            "cid",
            "secret",
            "http://localhost:8000/callback",
        );
        let tokens = oauth.exchange_code_for_token("abc").await.unwrap();
        assert_eq!(tokens.access_token, "at-1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt-1"));
    }

    #[tokio::test]
    async fn test_rejected_exchange_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .mount(&server)
            .await;

        let oauth = TickTickOAuth::with_token_url(
            &format!("{}/oauth/token", server.uri()),
            "cid",
            "secret",
            "http://localhost:8000/callback",
        );
        let err = oauth.exchange_code_for_token("stale").await.unwrap_err();
        assert!(matches!(err, TaskServiceError::Auth(_)));
    }
}
