//! Pure state transitions on a [`Session`].
//!
//! Every mutation the engine applies to a conversation lives here, free of
//! locking and persistence concerns, so the transition rules can be tested
//! directly.

use chat_provider::{ChatMessage, GenerationError, Role};
use session_store::{Message, Session};

use chat_api::reasoning::{REASONING_CLOSE, REASONING_OPEN};

const MAX_DERIVED_NAME_CHARS: usize = 30;

/// Derives a session name from the first user message.
#[must_use]
pub fn derive_session_name(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "Untitled".to_string();
    }

    if collapsed.chars().count() <= MAX_DERIVED_NAME_CHARS {
        collapsed
    } else {
        let truncated: String = collapsed.chars().take(MAX_DERIVED_NAME_CHARS).collect();
        format!("{truncated}…")
    }
}

/// Appends a user turn, naming the session on its first user message.
pub fn append_user_turn(session: &mut Session, text: impl Into<String>) -> String {
    let text = text.into();

    let is_first_user_turn = !session
        .messages
        .iter()
        .any(|message| message.role == Role::User);
    if is_first_user_turn {
        session.name = derive_session_name(&text);
    }

    let message = Message::user(text);
    let message_id = message.id.clone();
    session.messages.push(message);
    session.touch();
    message_id
}

/// Appends the placeholder assistant message a generation streams into.
pub fn append_pending_assistant(session: &mut Session) -> String {
    let message = Message::assistant_pending();
    let message_id = message.id.clone();
    session.messages.push(message);
    session.touch();
    message_id
}

/// Replaces the streaming message content with the accumulated snapshot.
pub fn apply_progress(session: &mut Session, message_id: &str, content: &str) {
    if let Some(message) = session.message_mut(message_id) {
        if message.generating {
            message.content = content.to_string();
        }
    }
}

pub fn finalize_success(
    session: &mut Session,
    message_id: &str,
    content: String,
    usage: session_store::MessageUsage,
) {
    if let Some(message) = session.message_mut(message_id) {
        message.content = content;
        message.usage = Some(usage);
        message.generating = false;
    }
    session.touch();
}

pub fn finalize_failure(session: &mut Session, message_id: &str, error: GenerationError) {
    if let Some(message) = session.message_mut(message_id) {
        message.error = Some(error);
        message.generating = false;
    }
    session.touch();
}

/// Marks the generation as aborted by the user, keeping the partial content.
pub fn finalize_cancelled(session: &mut Session, message_id: &str) {
    if let Some(message) = session.message_mut(message_id) {
        message.cancelled = true;
        message.generating = false;
    }
    session.touch();
}

/// Resets an assistant message for regeneration.
///
/// The message and everything after it are captured as a branch on the
/// revived message, so earlier attempts stay inspectable. The message keeps
/// its identifier.
pub fn begin_regeneration(session: &mut Session, message_id: &str) -> Option<String> {
    let index = session
        .messages
        .iter()
        .position(|message| message.id == message_id && message.role == Role::Assistant)?;

    let mut superseded = session.messages.split_off(index);
    let previous_branches = std::mem::take(&mut superseded[0].branches);

    let mut revived = Message::assistant_pending();
    revived.id = superseded[0].id.clone();
    revived.branches = previous_branches;
    revived.branches.push(superseded);

    let revived_id = revived.id.clone();
    session.messages.push(revived);
    session.touch();
    Some(revived_id)
}

/// Rewrites the content of an existing message, refreshing its word count.
pub fn edit_message_content(session: &mut Session, message_id: &str, content: &str) -> bool {
    let word_count = strip_reasoning(content).split_whitespace().count() as u32;
    let Some(message) = session.message_mut(message_id) else {
        return false;
    };

    message.content = content.to_string();
    if let Some(usage) = &mut message.usage {
        usage.word_count = word_count;
    }
    session.touch();
    true
}

/// Builds the model-facing history for a generation into `pending_id`.
///
/// Skips the pending message itself, assistant turns that failed, and turns
/// with nothing visible to say. Reasoning segments are stripped so the model
/// never sees its own demarcated thinking text; an optional copilot prompt
/// leads the history as a system turn.
#[must_use]
pub fn completion_history(
    session: &Session,
    pending_id: &str,
    copilot_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let mut history = Vec::new();

    if let Some(prompt) = copilot_prompt {
        if !prompt.trim().is_empty() {
            history.push(ChatMessage::new(Role::System, prompt.trim()));
        }
    }

    for message in &session.messages {
        if message.id == pending_id || message.generating || message.error.is_some() {
            continue;
        }

        let content = match message.role {
            Role::Assistant => strip_reasoning(&message.content),
            _ => message.content.as_str(),
        };
        if content.trim().is_empty() {
            continue;
        }

        history.push(ChatMessage::new(message.role, content));
    }

    history
}

/// Removes a leading demarcated reasoning segment from assistant text.
///
/// Content cancelled mid-reasoning has an opening marker with no close; all
/// of it is reasoning, so nothing visible remains.
#[must_use]
pub fn strip_reasoning(content: &str) -> &str {
    let Some(rest) = content.strip_prefix(REASONING_OPEN) else {
        return content;
    };

    match rest.find(REASONING_CLOSE) {
        Some(index) => rest[index + REASONING_CLOSE.len()..].trim_start(),
        None => "",
    }
}
