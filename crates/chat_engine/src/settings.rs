use chat_provider::ModelEntry;
use serde::{Deserialize, Serialize};
use session_store::{new_id, SessionStore, SETTINGS_KEY};
use tracing::warn;

/// Stored configuration for one OpenAI-compatible provider endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiCompatProviderSettings {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Cached `/models` listing from the last refresh.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub model_list: Vec<ModelEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_model: Option<String>,
    /// When the cached model list was last refreshed, in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_model: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_messages: Option<usize>,
}

impl OpenAiCompatProviderSettings {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: new_id(),
            name: name.into(),
            api_key: String::new(),
            base_url: None,
            model_list: Vec::new(),
            selected_model: None,
            last_updated_model: None,
            temperature: None,
            top_p: None,
            max_context_messages: None,
        }
    }
}

/// Application settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Currently selected provider: an entry uuid, or the mock provider id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub providers: Vec<OpenAiCompatProviderSettings>,
    /// System prompt applied to sessions without a copilot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_prompt: Option<String>,
    #[serde(default = "default_true")]
    pub show_word_count: bool,
    #[serde(default = "default_true")]
    pub show_model_name: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            current_provider_id: None,
            providers: Vec::new(),
            default_prompt: None,
            show_word_count: true,
            show_model_name: true,
        }
    }
}

impl Settings {
    /// Loads settings, falling back to defaults when the stored document is
    /// missing or no longer parses.
    #[must_use]
    pub fn load(store: &SessionStore) -> Self {
        match store.get_document::<Settings>(SETTINGS_KEY) {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(error) => {
                warn!(%error, "stored settings are unreadable, starting from defaults");
                Settings::default()
            }
        }
    }

    pub fn save(&self, store: &SessionStore) -> Result<(), session_store::SessionStoreError> {
        store.set_document(SETTINGS_KEY, self)
    }

    #[must_use]
    pub fn provider(&self, uuid: &str) -> Option<&OpenAiCompatProviderSettings> {
        self.providers.iter().find(|provider| provider.uuid == uuid)
    }

    #[must_use]
    pub fn provider_mut(&mut self, uuid: &str) -> Option<&mut OpenAiCompatProviderSettings> {
        self.providers
            .iter_mut()
            .find(|provider| provider.uuid == uuid)
    }
}
