//! OpenAI-compatible implementation of the shared `chat_provider` contract.
//!
//! This adapter translates `chat_api` transport results into deterministic
//! `GenerationEvent` lifecycle events expected by `chat_engine`.

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chat_api::error::parse_error_message;
use chat_api::{ChatApiClient, ChatApiConfig, ChatApiError, ModelInfo, PayloadMessage};
use chat_provider::{
    CancelSignal, ChatMessage, CompletionProvider, CompletionRequest, GenerationError,
    GenerationEvent, ModelEntry, ProviderInitError,
};
use tracing::debug;

/// Stable provider identifier used by `chat_engine` provider selection.
pub const OPENAI_COMPAT_PROVIDER_ID: &str = "openai-compat";

/// Runtime configuration for the OpenAI-compatible provider.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiCompatProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub user_agent: Option<String>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_context_messages: Option<usize>,
    pub extra_headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl OpenAiCompatProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            user_agent: None,
            temperature: None,
            top_p: None,
            max_context_messages: None,
            extra_headers: BTreeMap::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    #[must_use]
    pub fn with_max_context_messages(mut self, max_context_messages: usize) -> Self {
        self.max_context_messages = Some(max_context_messages);
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.api_key, self.model);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(user_agent) = self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        if let Some(top_p) = self.top_p {
            config = config.with_top_p(top_p);
        }
        if let Some(max_context_messages) = self.max_context_messages {
            config = config.with_max_context_messages(max_context_messages);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config.with_headers(self.extra_headers)
    }
}

trait StreamClient: Send + Sync {
    fn complete(
        &self,
        history: &[PayloadMessage],
        cancel: &CancelSignal,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<String, ChatApiError>;

    fn list_models(&self) -> Result<Vec<ModelInfo>, ChatApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: ChatApiClient,
}

impl DefaultStreamClient {
    fn runtime() -> Result<tokio::runtime::Runtime, ChatApiError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ChatApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })
    }
}

impl StreamClient for DefaultStreamClient {
    fn complete(
        &self,
        history: &[PayloadMessage],
        cancel: &CancelSignal,
        on_progress: &mut dyn FnMut(&str),
    ) -> Result<String, ChatApiError> {
        let runtime = Self::runtime()?;
        runtime.block_on(
            self.client
                .complete(history, Some(cancel), |text| on_progress(text)),
        )
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, ChatApiError> {
        let runtime = Self::runtime()?;
        runtime.block_on(self.client.list_models())
    }
}

/// `CompletionProvider` adapter backed by `chat_api` transport primitives.
pub struct OpenAiCompatProvider {
    stream_client: Arc<dyn StreamClient>,
}

impl OpenAiCompatProvider {
    /// Creates a provider using real OpenAI-compatible transport.
    pub fn new(config: OpenAiCompatProviderConfig) -> Result<Self, ProviderInitError> {
        let stream_client = Arc::new(DefaultStreamClient {
            client: ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?,
        });

        Ok(Self { stream_client })
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(stream_client: Arc<dyn StreamClient>) -> Self {
        Self { stream_client }
    }
}

impl CompletionProvider for OpenAiCompatProvider {
    fn provider_id(&self) -> &'static str {
        OPENAI_COMPAT_PROVIDER_ID
    }

    fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), String> {
        let generation_id = request.generation_id;

        emit(GenerationEvent::Started { generation_id });

        if cancel.load(Ordering::Acquire) {
            emit(GenerationEvent::Cancelled { generation_id });
            return Ok(());
        }

        let history = to_payload_history(&request.messages);
        debug!(generation_id, turns = history.len(), "starting completion");

        let outcome = self.stream_client.complete(&history, &cancel, &mut |text| {
            emit(GenerationEvent::Progress {
                generation_id,
                content: text.to_string(),
            });
        });

        match outcome {
            Ok(content) => emit(GenerationEvent::Finished {
                generation_id,
                content,
            }),
            Err(ChatApiError::Cancelled) => emit(GenerationEvent::Cancelled { generation_id }),
            Err(error) => emit(GenerationEvent::Failed {
                generation_id,
                error: map_error(error),
            }),
        }

        Ok(())
    }

    fn list_models(&self) -> Result<Vec<ModelEntry>, GenerationError> {
        let models = self.stream_client.list_models().map_err(map_error)?;
        Ok(models
            .into_iter()
            .map(|model| ModelEntry::new(model.id))
            .collect())
    }
}

fn to_payload_history(messages: &[ChatMessage]) -> Vec<PayloadMessage> {
    messages
        .iter()
        .map(|message| PayloadMessage::new(message.role.as_str(), message.content.clone()))
        .collect()
}

/// Classifies a transport failure into the stored error surface.
///
/// `ChatApiError::Cancelled` never reaches this function; callers map it to
/// the `Cancelled` lifecycle event instead of an error.
fn map_error(error: ChatApiError) -> GenerationError {
    match error {
        ChatApiError::Network(inner) => GenerationError::network(inner.to_string()),
        ChatApiError::Status(status, body) => GenerationError::http_status(
            status.as_u16(),
            parse_error_message(status, &body),
            body,
        ),
        ChatApiError::Provider { payload } => {
            let message = parse_error_message(chat_api::reqwest::StatusCode::OK, &payload);
            GenerationError::provider(payload, message)
        }
        ChatApiError::MalformedResponse(payload) => {
            GenerationError::malformed(format!("unparseable stream payload: {payload}"))
        }
        ChatApiError::Serde(inner) => GenerationError::malformed(inner.to_string()),
        ChatApiError::MissingApiKey
        | ChatApiError::InvalidHeader(_)
        | ChatApiError::Unknown(_)
        | ChatApiError::Cancelled => GenerationError::network(error.to_string()),
    }
}

fn map_init_error(error: ChatApiError) -> ProviderInitError {
    ProviderInitError::new(format!(
        "Failed to initialize openai-compat provider: {error}"
    ))
}
