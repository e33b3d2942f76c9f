//! Conversation orchestration on top of the provider and storage crates.
//!
//! `ChatEngine` owns the in-memory session map, enforces the one-generation-
//! per-session rule, runs providers on dedicated worker threads, and persists
//! sessions on every terminal generation event.

pub mod copilot;
pub mod engine;
pub mod error;
pub mod platform;
pub mod providers;
pub mod session;
pub mod settings;

pub use copilot::Copilot;
pub use engine::ChatEngine;
pub use error::EngineError;
pub use platform::{DesktopPlatform, Platform};
pub use providers::ProviderSelection;
pub use settings::{OpenAiCompatProviderSettings, Settings};
