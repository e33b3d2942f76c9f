use chat_provider::ProviderInitError;
use session_store::SessionStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown session '{session_id}'")]
    UnknownSession { session_id: String },

    #[error("unknown message '{message_id}' in session '{session_id}'")]
    UnknownMessage {
        session_id: String,
        message_id: String,
    },

    #[error("session '{session_id}' already has a generation in flight")]
    GenerationInFlight { session_id: String },

    #[error("no provider is configured; add one in settings first")]
    NoProviderConfigured,

    #[error("unknown provider '{provider_id}'")]
    UnknownProvider { provider_id: String },

    #[error(transparent)]
    ProviderInit(#[from] ProviderInitError),

    #[error(transparent)]
    Store(#[from] SessionStoreError),

    #[error("failed to spawn generation worker: {0}")]
    WorkerSpawn(String),

    #[error("model listing failed: {0}")]
    ModelListing(chat_provider::GenerationError),
}
