//! Transport-only OpenAI-compatible chat client primitives.
//!
//! This crate owns request building, server-sent-event decoding, and stream
//! accumulation for chat-completions endpoints only. It intentionally
//! contains no session state and no runtime UI coupling.
//!
//! Reasoning sub-streams (`reasoning_content` deltas) are demarcated inline
//! with `<think>`/`</think>` markers in the accumulated text rather than
//! surfaced as a separate channel; see [`reasoning::ReasoningDemarcator`].

pub use reqwest;

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod payload;
pub mod reasoning;
pub mod sse;
pub mod url;

pub use client::CancellationSignal;
pub use client::ChatApiClient;
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use events::ChatStreamEvent;
pub use payload::{CompletionPayload, ModelInfo, PayloadMessage};
pub use reasoning::{ReasoningDemarcator, REASONING_CLOSE, REASONING_OPEN};
pub use sse::{SseStreamParser, DONE_SENTINEL};
pub use url::{completions_url, models_url};
