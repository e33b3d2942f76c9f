//! Deterministic mock implementation of the shared `chat_provider` contract.
//!
//! This crate contains no transport/protocol logic and is intended for local
//! development and contract-level integration testing of `chat_engine`.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use chat_provider::{
    CancelSignal, CompletionProvider, CompletionRequest, GenerationError, GenerationEvent,
    ModelEntry,
};

/// Stable provider identifier used for explicit provider selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Deterministic mock provider used by `chat_engine` tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    chunks: Vec<String>,
    chunk_delay: Duration,
    failure: Option<GenerationError>,
    hold_open: bool,
}

impl MockProvider {
    /// Creates a mock provider streaming caller-provided chunks.
    #[must_use]
    pub fn new(chunks: Vec<String>) -> Self {
        Self {
            chunks,
            chunk_delay: Duration::from_millis(Self::CHUNK_DELAY_MS),
            failure: None,
            hold_open: false,
        }
    }

    /// Fails with `error` after the scripted chunks have streamed.
    #[must_use]
    pub fn with_failure(mut self, error: GenerationError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Overrides the inter-chunk pacing delay.
    #[must_use]
    pub fn with_chunk_delay(mut self, chunk_delay: Duration) -> Self {
        self.chunk_delay = chunk_delay;
        self
    }

    /// Keeps the generation open after the scripted chunks until cancelled.
    ///
    /// Used to exercise cancellation paths without timing races.
    #[must_use]
    pub fn with_hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    const CHUNK_DELAY_MS: u64 = 10;
    const HOLD_POLL_MS: u64 = 5;
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new(vec![
            "Hello! ".to_string(),
            "This is a deterministic mock reply ".to_string(),
            "streamed one chunk at a time.".to_string(),
        ])
    }
}

impl CompletionProvider for MockProvider {
    fn provider_id(&self) -> &'static str {
        MOCK_PROVIDER_ID
    }

    fn complete(
        &self,
        request: CompletionRequest,
        cancel: CancelSignal,
        emit: &mut dyn FnMut(GenerationEvent),
    ) -> Result<(), String> {
        let generation_id = request.generation_id;
        let _ = request.messages;

        emit(GenerationEvent::Started { generation_id });

        let mut accumulated = String::new();
        for chunk in &self.chunks {
            if cancel.load(Ordering::SeqCst) {
                emit(GenerationEvent::Cancelled { generation_id });
                return Ok(());
            }

            accumulated.push_str(chunk);
            emit(GenerationEvent::Progress {
                generation_id,
                content: accumulated.clone(),
            });
            thread::sleep(self.chunk_delay);
        }

        if self.hold_open {
            while !cancel.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(Self::HOLD_POLL_MS));
            }
        }

        if cancel.load(Ordering::SeqCst) {
            emit(GenerationEvent::Cancelled { generation_id });
            return Ok(());
        }

        if let Some(error) = &self.failure {
            emit(GenerationEvent::Failed {
                generation_id,
                error: error.clone(),
            });
            return Ok(());
        }

        emit(GenerationEvent::Finished {
            generation_id,
            content: accumulated,
        });

        Ok(())
    }

    fn list_models(&self) -> Result<Vec<ModelEntry>, GenerationError> {
        Ok(vec![
            ModelEntry::new("mock"),
            ModelEntry::new("mock-alt"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use chat_provider::{ChatMessage, Role};

    use super::*;

    fn collect_events(provider: &MockProvider, cancel: CancelSignal) -> Vec<GenerationEvent> {
        let mut events = Vec::new();
        provider
            .complete(
                CompletionRequest {
                    generation_id: 7,
                    messages: vec![ChatMessage::new(Role::User, "test")],
                },
                cancel,
                &mut |event| events.push(event),
            )
            .expect("mock completion should succeed");
        events
    }

    #[test]
    fn complete_emits_started_progress_and_finished() {
        let provider = MockProvider::new(vec!["one ".to_string(), "two".to_string()])
            .with_chunk_delay(Duration::ZERO);
        let cancel = Arc::new(AtomicBool::new(false));

        let events = collect_events(&provider, cancel);

        assert!(matches!(
            events.first(),
            Some(GenerationEvent::Started { generation_id: 7 })
        ));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Finished { generation_id: 7, content }) if content == "one two"
        ));
        assert!(events.iter().any(|event| matches!(
            event,
            GenerationEvent::Progress { content, .. } if content == "one "
        )));
    }

    #[test]
    fn progress_carries_accumulated_content_not_deltas() {
        let provider = MockProvider::new(vec!["a".to_string(), "b".to_string(), "c".to_string()])
            .with_chunk_delay(Duration::ZERO);
        let cancel = Arc::new(AtomicBool::new(false));

        let snapshots: Vec<String> = collect_events(&provider, cancel)
            .into_iter()
            .filter_map(|event| match event {
                GenerationEvent::Progress { content, .. } => Some(content),
                _ => None,
            })
            .collect();

        assert_eq!(snapshots, vec!["a", "ab", "abc"]);
    }

    #[test]
    fn complete_emits_cancelled_when_cancel_is_set() {
        let provider = MockProvider::new(vec!["ignored".to_string()]);
        let cancel = Arc::new(AtomicBool::new(true));

        let events = collect_events(&provider, cancel);

        assert_eq!(
            events,
            vec![
                GenerationEvent::Started { generation_id: 7 },
                GenerationEvent::Cancelled { generation_id: 7 },
            ]
        );
    }

    #[test]
    fn scripted_failure_surfaces_after_streamed_chunks() {
        let provider = MockProvider::new(vec!["partial".to_string()])
            .with_chunk_delay(Duration::ZERO)
            .with_failure(GenerationError::network("connection reset"));
        let cancel = Arc::new(AtomicBool::new(false));

        let events = collect_events(&provider, cancel);

        assert!(events.iter().any(|event| matches!(
            event,
            GenerationEvent::Progress { content, .. } if content == "partial"
        )));
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Failed { generation_id: 7, error })
                if error.message == "connection reset"
        ));
    }

    #[test]
    fn hold_open_blocks_until_cancelled() {
        let provider = Arc::new(
            MockProvider::new(vec!["chunk".to_string()])
                .with_chunk_delay(Duration::ZERO)
                .with_hold_open(),
        );
        let cancel = Arc::new(AtomicBool::new(false));

        let handle = thread::spawn({
            let provider = Arc::clone(&provider);
            let cancel = Arc::clone(&cancel);
            move || {
                let mut events = Vec::new();
                provider
                    .complete(
                        CompletionRequest {
                            generation_id: 7,
                            messages: Vec::new(),
                        },
                        cancel,
                        &mut |event| events.push(event),
                    )
                    .expect("mock completion should succeed");
                events
            }
        });

        thread::sleep(Duration::from_millis(30));
        cancel.store(true, Ordering::SeqCst);

        let events = handle.join().expect("mock thread should join");
        assert!(matches!(
            events.last(),
            Some(GenerationEvent::Cancelled { generation_id: 7 })
        ));
    }

    #[test]
    fn list_models_reports_deterministic_entries() {
        let models = MockProvider::default()
            .list_models()
            .expect("mock model list");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "mock");
    }
}
