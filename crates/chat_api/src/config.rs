use std::collections::BTreeMap;
use std::time::Duration;

use crate::url::DEFAULT_BASE_URL;

/// Default sampling temperature when the provider configuration omits one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Default nucleus-sampling top-p when the provider configuration omits one.
pub const DEFAULT_TOP_P: f64 = 0.5;
/// Default context-window truncation count for completion history.
pub const DEFAULT_MAX_CONTEXT_MESSAGES: usize = 20;

/// Transport configuration for one OpenAI-compatible provider instance.
#[derive(Debug, Clone)]
pub struct ChatApiConfig {
    /// API key passed as `Authorization: Bearer`.
    pub api_key: String,
    /// Base URL of the provider, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model identifier sent with every completion request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus-sampling top-p.
    pub top_p: f64,
    /// Number of trailing history messages included in each request.
    pub max_context_messages: usize,
    /// Optional `User-Agent` override.
    pub user_agent: Option<String>,
    /// Additional headers merged into request headers.
    pub extra_headers: BTreeMap<String, String>,
    /// Optional request timeout. None means no implicit timeout; callers
    /// cancel explicitly.
    pub timeout: Option<Duration>,
}

impl Default for ChatApiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_context_messages: DEFAULT_MAX_CONTEXT_MESSAGES,
            user_agent: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }
}

impl ChatApiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_context_messages(mut self, max_context_messages: usize) -> Self {
        self.max_context_messages = max_context_messages;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn insert_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.extra_headers.extend(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
