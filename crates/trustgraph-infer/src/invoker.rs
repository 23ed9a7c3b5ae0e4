//! Single-shot chat-completion calls.
//!
//! One request in, one completion string out. No retries, no backoff, no
//! interpretation of the returned text.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{InferenceConfig, OPENAI_API_KEY_ENV};
use crate::error::InvokeError;

/// Upstream error bodies are cut to this many characters.
pub const UPSTREAM_BODY_EXCERPT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f64,
}

impl ModelRequest {
    pub fn new(system: &str, prompt: String, temperature: f64) -> Self {
        Self {
            system: system.to_string(),
            prompt,
            temperature,
        }
    }
}

#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Checks everything that can be known without touching the network.
    fn ensure_configured(&self) -> Result<(), InvokeError> {
        Ok(())
    }

    /// Returns the first completion's message content.
    async fn complete(&self, request: &ModelRequest) -> Result<String, InvokeError>;

    /// Model identifier, for logging.
    fn model(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible chat completions
// ============================================================================

pub struct OpenAiChatInvoker {
    client: Client,
    config: InferenceConfig,
}

impl OpenAiChatInvoker {
    pub fn new(config: InferenceConfig) -> Result<Self, InvokeError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| InvokeError::Client(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str, InvokeError> {
        self.config
            .api_key
            .as_deref()
            .ok_or(InvokeError::NotConfigured(OPENAI_API_KEY_ENV))
    }
}

#[async_trait]
impl ModelInvoker for OpenAiChatInvoker {
    fn ensure_configured(&self) -> Result<(), InvokeError> {
        self.api_key().map(|_| ())
    }

    async fn complete(&self, request: &ModelRequest) -> Result<String, InvokeError> {
        let api_key = self.api_key()?;
        let url = self.config.chat_completions_url();

        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
            "temperature": request.temperature,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| InvokeError::Network {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), model = %self.config.model, "inference service returned an error");
            return Err(InvokeError::Upstream {
                status: status.as_u16(),
                body: excerpt(&text, UPSTREAM_BODY_EXCERPT_CHARS),
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| InvokeError::InvalidResponse(e.to_string()))?;

        Ok(first_choice_content(&data))
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// `choices[0].message.content`, or empty when the shape is unexpected.
///
/// An empty completion is not an error here; the extractor decides what
/// nothing means for each pipeline.
pub fn first_choice_content(data: &serde_json::Value) -> String {
    data["choices"][0]["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

// ============================================================================
// Mock invoker
// ============================================================================

/// Canned completions, cycled in order. Records every request it receives.
pub struct MockInvoker {
    responses: Vec<String>,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockInvoker {
    /// Reply used by `--llm-mock`: valid for both pipelines, selects nothing.
    pub const EMPTY_REPLY: &'static str = r#"{"matches":[],"layout":[]}"#;

    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(response: &str) -> Self {
        Self::new(vec![response.to_string()])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelInvoker for MockInvoker {
    async fn complete(&self, request: &ModelRequest) -> Result<String, InvokeError> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        if self.responses.is_empty() {
            return Ok(String::new());
        }
        Ok(self.responses[idx % self.responses.len()].clone())
    }

    fn model(&self) -> &str {
        "mock"
    }
}
