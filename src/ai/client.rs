//! Chat-completion client for OpenRouter.
//!
//! Single POST to `/chat/completions` with Bearer auth. Returns the raw
//! assistant message text; per-operation JSON parsing happens in the engine.

use serde::Deserialize;

use super::AiError;

const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, model: &str, temperature: f64) -> Self {
        Self::with_base_url(OPENROUTER_API_BASE, api_key, model, temperature)
    }

    /// Point the client at a different API base. Used by tests.
    pub fn with_base_url(base_url: &str, api_key: &str, model: &str, temperature: f64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
        }
    }

    /// One chat-completion round trip. `temperature` overrides the configured
    /// default when given (a couple of operations run cooler).
    pub async fn chat_completion(
        &self,
        system: &str,
        user: &str,
        temperature: Option<f64>,
    ) -> Result<String, AiError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": temperature.unwrap_or(self.temperature),
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AiError::Auth(format!(
                "Completion API rejected credentials ({})",
                status
            )));
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AiError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: CompletionResponse = resp.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiError::EmptyResponse)
    }
}
