//! Inference-service configuration.
//!
//! Resolved once at startup (env, then CLI overrides) and handed to the
//! invoker at construction time. Request handling never reads the environment.

use std::fmt;
use std::time::Duration;

use crate::error::ConfigError;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const TRUSTGRAPH_LLM_TIMEOUT_SECS_ENV: &str = "TRUSTGRAPH_LLM_TIMEOUT_SECS";

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Clone, PartialEq)]
pub struct InferenceConfig {
    /// Bearer credential. `None` means every call fails fast with `NotConfigured`.
    pub api_key: Option<String>,
    pub model: String,
    /// Normalized: has a scheme, no trailing `/`.
    pub base_url: String,
    /// `None` disables the client-side timeout.
    pub timeout: Option<Duration>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }
}

// Keep the credential out of logs.
impl fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl InferenceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    ///
    /// Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self {
            api_key: get(OPENAI_API_KEY_ENV),
            ..Self::default()
        };
        if let Some(model) = get(OPENAI_MODEL_ENV) {
            config.model = model;
        }
        if let Some(base_url) = get(OPENAI_BASE_URL_ENV) {
            config = config.with_base_url(&base_url)?;
        }
        if let Some(raw) = get(TRUSTGRAPH_LLM_TIMEOUT_SECS_ENV) {
            let secs: u64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                name: TRUSTGRAPH_LLM_TIMEOUT_SECS_ENV,
                value: raw.clone(),
                reason: format!("{e}"),
            })?;
            config = config.with_timeout_secs(secs);
        }
        Ok(config)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        let key = key.trim();
        self.api_key = if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        };
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ConfigError> {
        let normalized = normalize_http_base_url(base_url, DEFAULT_OPENAI_BASE_URL);
        url::Url::parse(&normalized).map_err(|e| ConfigError::InvalidValue {
            name: OPENAI_BASE_URL_ENV,
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.base_url = normalized;
        Ok(self)
    }

    /// `0` disables the timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        };
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

pub fn normalize_http_base_url(base_url: &str, default: &str) -> String {
    let mut host = base_url.trim().to_string();
    if host.is_empty() {
        host = default.to_string();
    }
    if !host.starts_with("http://") && !host.starts_with("https://") {
        host = format!("https://{host}");
    }
    host.trim_end_matches('/').to_string()
}
