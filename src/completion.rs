//! Chat completion client abstraction and the OpenAI implementation.
//!
//! The [`CompletionClient`] trait is the seam between the suggestion
//! generator and the remote model. Production uses [`OpenAIClient`]; tests
//! substitute scripted clients.
//!
//! # Provider Selection
//!
//! [`create_client`] returns `None` when no credential is configured, which
//! switches the generator to the fallback heuristics:
//!
//! ```rust,no_run
//! # use docxai::config::ModelConfig;
//! # use docxai::completion::create_client;
//! let client = create_client(&ModelConfig::default()).unwrap();
//! println!("model path enabled: {}", client.is_some());
//! ```
//!
//! # Failures
//!
//! Every transport error and non-success HTTP status maps to
//! [`DocxError::UpstreamUnavailable`]. Requests are not retried here; the
//! only retry in the analysis pipeline is the single re-ask on an
//! unparseable reply.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::ModelConfig;
use crate::error::{DocxError, Result};

/// One chat completion request: a system instruction and a user message.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// Ask the API to constrain output to a JSON object.
    pub json_mode: bool,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Returns the raw text content of the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Client for the OpenAI `POST /chat/completions` endpoint.
pub struct OpenAIClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAIClient {
    pub fn new(config: &ModelConfig, api_key: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl CompletionClient for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if request.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DocxError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(DocxError::UpstreamUnavailable(format!(
                "OpenAI API error {}: {}",
                status,
                truncate(&body_text, 300)
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| DocxError::UpstreamUnavailable(format!("invalid API envelope: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DocxError::UpstreamUnavailable("empty completion".to_string()))
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Builds the completion client when a credential is available.
pub fn create_client(
    config: &ModelConfig,
) -> anyhow::Result<Option<std::sync::Arc<dyn CompletionClient>>> {
    match config.api_key() {
        Some(key) => {
            let client = OpenAIClient::new(config, key)?;
            Ok(Some(std::sync::Arc::new(client)))
        }
        None => Ok(None),
    }
}
