//! Inline demarcation of the reasoning sub-stream.
//!
//! Some providers interleave a `reasoning_content` channel with the normal
//! assistant text. The demarcation is purely textual: an opening marker when
//! the channel opens (signalled by an empty-string delta), the reasoning text
//! verbatim, and a closing marker emitted immediately before the first
//! assistant-text delta that arrives with the channel structurally absent.

/// Marker emitted when a reasoning segment opens.
pub const REASONING_OPEN: &str = "<think>";
/// Marker emitted when a reasoning segment closes.
pub const REASONING_CLOSE: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Reasoning,
}

/// Two-state machine translating delta events into visible text.
///
/// Providers without a reasoning channel never send the empty-string
/// sentinel, so the machine stays in `Normal` permanently and passes
/// assistant text through unchanged.
#[derive(Debug)]
pub struct ReasoningDemarcator {
    state: State,
}

impl Default for ReasoningDemarcator {
    fn default() -> Self {
        Self {
            state: State::Normal,
        }
    }
}

impl ReasoningDemarcator {
    /// Returns the visible text contributed by one delta event.
    ///
    /// An empty return means the event produced nothing visible and no
    /// progress callback should fire for it.
    pub fn apply(&mut self, content: Option<&str>, reasoning: Option<&str>) -> String {
        match self.state {
            State::Normal => {
                if reasoning == Some("") {
                    self.state = State::Reasoning;
                    // The opening event carries no visible assistant text;
                    // only the marker is appended.
                    return REASONING_OPEN.to_string();
                }

                content.unwrap_or_default().to_string()
            }
            State::Reasoning => match reasoning {
                Some(text) => text.to_string(),
                None => match content {
                    Some(text) => {
                        self.state = State::Normal;
                        format!("{REASONING_CLOSE}{text}")
                    }
                    None => String::new(),
                },
            },
        }
    }
}
