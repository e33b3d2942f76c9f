use serde_json::Value;

use crate::error::ChatApiError;
use crate::sse::DONE_SENTINEL;

/// Application-level event mapped from one SSE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// One incremental delta from `choices[0].delta`.
    ///
    /// `reasoning` preserves the wire protocol's three-way distinction:
    /// `None` when `reasoning_content` is structurally absent (or JSON null),
    /// `Some("")` for the empty sentinel that opens a reasoning segment, and
    /// `Some(text)` while reasoning text streams. Collapsing these loses the
    /// demarcation state transitions.
    Delta {
        content: Option<String>,
        reasoning: Option<String>,
    },
    /// Explicit `[DONE]` terminator.
    Done,
    /// Provider-reported error object embedded in the stream; carries the
    /// raw payload for caller-side classification.
    ProviderError { payload: String },
}

/// Map one decoded payload string to a stream event.
///
/// Payloads that are not valid JSON fail with `MalformedResponse`; events
/// without a recognizable delta map to an empty `Delta` and produce no
/// visible text downstream.
pub fn map_payload(payload: &str) -> Result<ChatStreamEvent, ChatApiError> {
    if payload == DONE_SENTINEL {
        return Ok(ChatStreamEvent::Done);
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|_| ChatApiError::MalformedResponse(payload.to_string()))?;

    if value.get("error").is_some() {
        return Ok(ChatStreamEvent::ProviderError {
            payload: payload.to_string(),
        });
    }

    let delta = value
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("delta"));

    let content = delta
        .and_then(|delta| delta.get("content"))
        .and_then(|value| value.as_str())
        .map(ToString::to_string);
    let reasoning = delta
        .and_then(|delta| delta.get("reasoning_content"))
        .and_then(|value| value.as_str())
        .map(ToString::to_string);

    Ok(ChatStreamEvent::Delta { content, reasoning })
}
