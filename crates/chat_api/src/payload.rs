use serde::{Deserialize, Serialize};

use crate::config::ChatApiConfig;

/// One role-tagged turn in the request payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub role: String,
    pub content: String,
}

impl PayloadMessage {
    #[must_use]
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Canonical request payload shape for chat-completions endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionPayload {
    pub messages: Vec<PayloadMessage>,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Always true; non-streaming responses are not part of this transport.
    pub stream: bool,
}

impl CompletionPayload {
    /// Builds a payload from the tail of `history`, respecting the configured
    /// max-context-message count.
    #[must_use]
    pub fn from_history(config: &ChatApiConfig, history: &[PayloadMessage]) -> Self {
        let window = config.max_context_messages.max(1);
        let tail_start = history.len().saturating_sub(window);

        Self {
            messages: history[tail_start..].to_vec(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            stream: true,
        }
    }
}

/// Model descriptor returned by the `/models` listing endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

/// Response envelope of the `/models` listing endpoint.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ModelListResponse {
    pub data: Option<Vec<ModelInfo>>,
}
