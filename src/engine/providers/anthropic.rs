// Daimon Engine — Anthropic provider
// Messages API, non-streaming. Text blocks of the reply are concatenated.

use crate::atoms::error::ProviderError;
use crate::atoms::traits::AiProvider;
use crate::atoms::types::{GenerateRequest, Generation, ProviderConfig, ProviderKind};
use crate::engine::http::{self, CircuitBreaker};
use async_trait::async_trait;
use log::info;
use reqwest::Client;
use serde_json::{json, Value};

const API_VERSION: &str = "2023-06-01";
const FALLBACK_MODEL: &str = "claude-3-5-haiku-latest";
const MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    name: String,
    client: Client,
    base_url: String,
    api_key: String,
    default_model: String,
    circuit: CircuitBreaker,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig, timeout_secs: u64) -> Self {
        AnthropicProvider {
            name: config.id.clone(),
            client: http::build_client(timeout_secs),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ProviderKind::Anthropic.default_base_url().to_string()),
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone().unwrap_or_else(|| FALLBACK_MODEL.into()),
            circuit: CircuitBreaker::default(),
        }
    }

    fn request_body(model: &str, prompt: &str) -> Value {
        json!({
            "model": model,
            "max_tokens": MAX_TOKENS,
            "messages": [{"role": "user", "content": prompt}],
        })
    }

    fn parse_response(v: &Value) -> Option<String> {
        let blocks = v["content"].as_array()?;
        let text: String = blocks
            .iter()
            .filter(|b| b["type"] == "text")
            .filter_map(|b| b["text"].as_str())
            .collect::<Vec<_>>()
            .join("");
        Some(text)
    }
}

#[async_trait]
impl AiProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Auth(format!("{}: no api_key configured", self.name)));
        }
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        info!("[provider] {} request to {} model={}", self.name, url, model);

        let headers = [
            ("x-api-key", self.api_key.clone()),
            ("anthropic-version", API_VERSION.to_string()),
        ];
        let body = Self::request_body(model, &request.prompt);
        let v = http::post_json(&self.client, &self.circuit, &self.name, &url, &headers, &body).await?;
        let text = Self::parse_response(&v)
            .ok_or_else(|| ProviderError::Malformed(format!("{}: no content blocks", self.name)))?;

        Ok(Generation { text, session_handle: None, provider: self.name.clone() })
    }
}
