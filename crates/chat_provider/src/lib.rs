//! Minimal provider-agnostic contract for executing a single completion.
//!
//! This crate intentionally defines only the shared generation lifecycle and
//! the classified error surface stored on conversation messages. It excludes
//! provider transport details, protocol payloads, and session orchestration
//! concerns.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

/// Identifier for one completion generation.
pub type GenerationId = u64;

/// Shared cancellation flag for a generation.
pub type CancelSignal = Arc<AtomicBool>;

/// Conversation role of one chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Provider-neutral model-facing history item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Input required to start a completion generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub generation_id: GenerationId,
    pub messages: Vec<ChatMessage>,
}

/// Model advertised by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
    pub display_name: String,
}

impl ModelEntry {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
        }
    }
}

/// Classification of a failed generation.
///
/// Cancellation is deliberately not a kind here: a cancelled generation is a
/// distinct terminal state, not a stored error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Connection could not be established or was interrupted.
    Network,
    /// Non-success HTTP status; `GenerationError::status` carries the code.
    HttpStatus,
    /// The protocol-level payload reported an error; `payload` carries it raw.
    Provider,
    /// A payload did not parse as expected.
    MalformedResponse,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::HttpStatus => "http-status",
            Self::Provider => "provider-error",
            Self::MalformedResponse => "malformed-response",
        }
    }
}

/// Classified failure stored on a conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl GenerationError {
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            message: message.into(),
            status: None,
            payload: None,
        }
    }

    #[must_use]
    pub fn http_status(status: u16, message: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::HttpStatus,
            message: message.into(),
            status: Some(status),
            payload: Some(body.into()),
        }
    }

    #[must_use]
    pub fn provider(payload: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Provider,
            message: message.into(),
            status: None,
            payload: Some(payload.into()),
        }
    }

    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::MalformedResponse,
            message: message.into(),
            status: None,
            payload: None,
        }
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Pair the stable kind tag with the human-readable message so stored
        // errors stay greppable in exported conversations.
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Error returned while constructing/configuring a provider before any
/// generation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Provider-emitted lifecycle event for a generation.
///
/// `Progress` carries the full accumulated text so far, not a delta; it is
/// the sole mechanism for live message updates and is delivered strictly in
/// parse order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Started {
        generation_id: GenerationId,
    },
    Progress {
        generation_id: GenerationId,
        content: String,
    },
    Finished {
        generation_id: GenerationId,
        content: String,
    },
    Failed {
        generation_id: GenerationId,
        error: GenerationError,
    },
    Cancelled {
        generation_id: GenerationId,
    },
}

impl GenerationEvent {
    /// Returns the generation identifier associated with this event.
    #[must_use]
    pub fn generation_id(&self) -> GenerationId {
        match self {
            Self::Started { generation_id }
            | Self::Progress { generation_id, .. }
            | Self::Finished { generation_id, .. }
            | Self::Failed { generation_id, .. }
            | Self::Cancelled { generation_id } => *generation_id,
        }
    }

    /// Returns true when this event terminates the generation lifecycle.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Finished { .. } | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }
}

/// Contract implemented by every completion backend.
pub trait CompletionProvider: Send + Sync {
    /// Stable identifier used by provider selection and stored settings.
    fn provider_id(&self) -> &'static str;

    /// Runs one generation through to a terminal event.
    ///
    /// Implementations emit `Started` first and exactly one terminal event
    /// last. `Ok(())` means the lifecycle ran to a terminal event; a failed
    /// generation is reported through `GenerationEvent::Failed`, not the
    /// return value.
    fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), String>;

    /// Fetches the models this provider currently advertises.
    fn list_models(&self) -> Result<Vec<ModelEntry>, GenerationError>;
}
