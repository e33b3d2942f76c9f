use chat_provider::{
    CancelSignal, CompletionProvider, CompletionRequest, GenerationError, GenerationEvent,
    ModelEntry, ProviderInitError,
};
use chat_provider_mock::{MockProvider, MOCK_PROVIDER_ID};
use chat_provider_openai::{OpenAiCompatProvider, OpenAiCompatProviderConfig};
use session_store::Session;

use crate::error::EngineError;
use crate::settings::{OpenAiCompatProviderSettings, Settings};

/// The closed set of completion backends the engine can drive.
///
/// Dispatch is a plain match rather than a trait object so adding a backend
/// is a compile-checked change at every call site.
pub enum ProviderSelection {
    OpenAiCompat(OpenAiCompatProvider),
    Mock(MockProvider),
}

impl ProviderSelection {
    /// Resolves the provider for `session` from stored settings.
    ///
    /// The session's own provider choice wins; otherwise the globally
    /// selected provider applies.
    pub fn from_settings(
        settings: &Settings,
        session: &Session,
        user_agent: Option<&str>,
    ) -> Result<Self, EngineError> {
        let provider_id = session
            .provider_id
            .as_deref()
            .or(settings.current_provider_id.as_deref())
            .ok_or(EngineError::NoProviderConfigured)?;

        if provider_id == MOCK_PROVIDER_ID {
            return Ok(Self::Mock(MockProvider::default()));
        }

        let entry = settings
            .provider(provider_id)
            .ok_or_else(|| EngineError::UnknownProvider {
                provider_id: provider_id.to_string(),
            })?;

        let provider = OpenAiCompatProvider::new(openai_config(entry, session, user_agent)?)?;
        Ok(Self::OpenAiCompat(provider))
    }

    /// Builds a provider suitable only for listing models; no session is in
    /// play, so whichever model happens to be cached is fine.
    pub fn for_model_listing(
        entry: &OpenAiCompatProviderSettings,
        user_agent: Option<&str>,
    ) -> Result<Self, EngineError> {
        let model = entry
            .selected_model
            .clone()
            .or_else(|| entry.model_list.first().map(|model| model.id.clone()))
            .unwrap_or_default();
        let provider = OpenAiCompatProvider::new(entry_config(entry, model, user_agent))?;
        Ok(Self::OpenAiCompat(provider))
    }

    #[must_use]
    pub fn provider_id(&self) -> &'static str {
        match self {
            Self::OpenAiCompat(provider) => provider.provider_id(),
            Self::Mock(provider) => provider.provider_id(),
        }
    }

    pub fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), String> {
        match self {
            Self::OpenAiCompat(provider) => provider.complete(request, cancel, emit),
            Self::Mock(provider) => provider.complete(request, cancel, emit),
        }
    }

    pub fn list_models(&self) -> Result<Vec<ModelEntry>, GenerationError> {
        match self {
            Self::OpenAiCompat(provider) => provider.list_models(),
            Self::Mock(provider) => provider.list_models(),
        }
    }
}

fn openai_config(
    entry: &OpenAiCompatProviderSettings,
    session: &Session,
    user_agent: Option<&str>,
) -> Result<OpenAiCompatProviderConfig, ProviderInitError> {
    let model = session
        .model
        .clone()
        .or_else(|| entry.selected_model.clone())
        .or_else(|| entry.model_list.first().map(|model| model.id.clone()))
        .ok_or_else(|| {
            ProviderInitError::new(format!("provider '{}' has no model selected", entry.name))
        })?;

    Ok(entry_config(entry, model, user_agent))
}

fn entry_config(
    entry: &OpenAiCompatProviderSettings,
    model: String,
    user_agent: Option<&str>,
) -> OpenAiCompatProviderConfig {
    let mut config = OpenAiCompatProviderConfig::new(entry.api_key.clone(), model);
    if let Some(base_url) = &entry.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(user_agent) = user_agent {
        config = config.with_user_agent(user_agent);
    }
    if let Some(temperature) = entry.temperature {
        config = config.with_temperature(temperature);
    }
    if let Some(top_p) = entry.top_p {
        config = config.with_top_p(top_p);
    }
    if let Some(max_context_messages) = entry.max_context_messages {
        config = config.with_max_context_messages(max_context_messages);
    }

    config
}
