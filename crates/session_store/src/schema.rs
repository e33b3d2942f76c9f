use chat_provider::{GenerationError, Role};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Version stamp written into every persisted session document.
pub const SCHEMA_VERSION: u32 = 1;

/// Returns a fresh unique identifier for sessions and messages.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Usage accounting attached to a finalized assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageUsage {
    /// Whitespace-separated word count of the final content.
    pub word_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u32>,
    /// Wall-clock duration of the generation in milliseconds.
    pub generation_ms: u64,
}

/// One conversation turn.
///
/// `generating` is runtime-only state: it is never serialized, so a session
/// loaded from disk can never resurrect a stale in-flight flag from a
/// previous process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GenerationError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<MessageUsage>,
    /// True when the user aborted this generation; the partial content up to
    /// the abort is kept.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    /// Superseded continuations captured when the message was regenerated.
    /// Each branch holds the messages that followed the regeneration point.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<Vec<Message>>,
    #[serde(default, skip_serializing)]
    pub generating: bool,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: now_ms(),
            error: None,
            usage: None,
            cancelled: false,
            branches: Vec::new(),
            generating: false,
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Placeholder assistant message for a generation that has not produced
    /// output yet.
    #[must_use]
    pub fn assistant_pending() -> Self {
        let mut message = Self::new(Role::Assistant, "");
        message.generating = true;
        message
    }

    /// Whitespace-separated word count of `content`.
    #[must_use]
    pub fn word_count(&self) -> u32 {
        self.content.split_whitespace().count() as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Chat,
}

/// A persisted conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub version: u32,
    #[serde(default, rename = "type")]
    pub session_type: SessionType,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Copilot (system-prompt persona) applied to this session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub copilot_id: Option<String>,
    /// Provider configuration this session targets; falls back to the
    /// globally selected provider when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Last-modified time in milliseconds since the Unix epoch.
    pub update_time: i64,
}

impl Session {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            version: SCHEMA_VERSION,
            session_type: SessionType::Chat,
            name: name.into(),
            messages: Vec::new(),
            copilot_id: None,
            provider_id: None,
            model: None,
            update_time: now_ms(),
        }
    }

    /// Bumps the last-modified timestamp.
    pub fn touch(&mut self) {
        self.update_time = now_ms();
    }

    #[must_use]
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|message| message.id == message_id)
    }

    #[must_use]
    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|message| message.id == message_id)
    }

    /// True when any message in this session is still generating.
    #[must_use]
    pub fn has_generating_message(&self) -> bool {
        self.messages.iter().any(|message| message.generating)
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, Session};

    #[test]
    fn assistant_pending_messages_start_generating_and_empty() {
        let message = Message::assistant_pending();
        assert!(message.generating);
        assert!(message.content.is_empty());
        assert!(message.error.is_none());
    }

    #[test]
    fn generating_flag_is_not_persisted() {
        let mut session = Session::new("scratch");
        session.messages.push(Message::assistant_pending());

        let json = serde_json::to_string(&session).expect("serialize session");
        assert!(!json.contains("generating"));

        let loaded: Session = serde_json::from_str(&json).expect("deserialize session");
        assert!(!loaded.has_generating_message());
    }

    #[test]
    fn word_count_splits_on_whitespace() {
        let mut message = Message::user("one two  three\nfour");
        assert_eq!(message.word_count(), 4);

        message.content.clear();
        assert_eq!(message.word_count(), 0);
    }

    #[test]
    fn absent_optional_fields_round_trip_as_defaults() {
        let json = r#"{"id":"m1","role":"assistant","content":"hi","timestamp":1}"#;
        let message: Message = serde_json::from_str(json).expect("deserialize message");

        assert!(!message.cancelled);
        assert!(message.branches.is_empty());
        assert!(message.usage.is_none());
    }
}
