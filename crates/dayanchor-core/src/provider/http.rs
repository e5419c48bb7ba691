//! HTTP scoring provider speaking the chat-completions JSON protocol.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use url::Url;

use super::{CompletionRequest, ScoringProvider};
use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct HttpScoringProvider {
    endpoint: Url,
    model: String,
    api_key: String,
    http_client: Client,
}

impl HttpScoringProvider {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        // Url::join replaces the last path segment unless the base ends in '/'
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let endpoint = Url::parse(&base)?.join("chat/completions")?;

        Ok(Self {
            endpoint,
            model: model.into(),
            api_key: api_key.into(),
            http_client: Client::new(),
        })
    }

    /// Build from configuration, reading the API key from the configured env var.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::MissingApiKey(config.api_key_env.clone()))?;
        Self::new(&config.base_url, config.model.clone(), api_key)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ScoringProvider for HttpScoringProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = json!({
            "model": &self.model,
            "temperature": 0,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": &request.system },
                { "role": "user", "content": &request.prompt },
            ],
        });

        let resp = self
            .http_client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .header("x-request-id", request.run_id.to_string())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = resp.json().await?;
        data["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".to_string()))
    }
}
