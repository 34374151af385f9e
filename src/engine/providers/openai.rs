// Daimon Engine — OpenAI-compatible provider
// Handles OpenAI, OpenRouter, Ollama and any custom base URL speaking the
// chat/completions wire format. One user message in, one choice out.

use crate::atoms::error::ProviderError;
use crate::atoms::traits::AiProvider;
use crate::atoms::types::{GenerateRequest, Generation, ProviderConfig, ProviderKind};
use crate::engine::http::{self, CircuitBreaker};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};

const FALLBACK_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiProvider {
    name: String,
    kind: ProviderKind,
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
    circuit: CircuitBreaker,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, timeout_secs: u64) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        OpenAiProvider {
            name: config.id.clone(),
            kind: config.kind,
            client: http::build_client(timeout_secs),
            base_url,
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone().unwrap_or_else(|| FALLBACK_MODEL.into()),
            circuit: CircuitBreaker::default(),
        }
    }

    fn request_body(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        })
    }

    /// First choice's message content. `None` when the shape is unexpected.
    fn parse_response(v: &Value) -> Option<String> {
        v["choices"].get(0)?["message"]["content"].as_str().map(str::to_string)
    }
}

#[async_trait]
impl AiProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        if self.base_url.is_empty() {
            return Err(ProviderError::Unavailable(format!("{}: no base_url configured", self.name)));
        }
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        info!("[provider] {} request to {} model={}", self.name, url, model);

        let mut headers = Vec::new();
        // Ollama accepts requests without a key.
        if !self.api_key.is_empty() {
            headers.push(("Authorization", format!("Bearer {}", self.api_key)));
        }

        let body = Self::request_body(model, &request.prompt);
        let v = http::post_json(&self.client, &self.circuit, &self.name, &url, &headers, &body).await?;
        let text = Self::parse_response(&v)
            .ok_or_else(|| ProviderError::Malformed(format!("{}: no choices[0].message.content", self.name)))?;

        Ok(Generation { text, session_handle: None, provider: self.name.clone() })
    }
}
