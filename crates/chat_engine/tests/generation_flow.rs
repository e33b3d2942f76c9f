mod support;

use std::sync::Arc;
use std::time::Duration;

use chat_engine::{ChatEngine, EngineError, ProviderSelection};
use chat_provider::{ErrorKind, GenerationError};
use chat_provider_mock::MockProvider;
use session_store::SessionStore;

use support::{wait_until, SETTLE_TIMEOUT};

const MOCK_REPLY: &str = "Hello! This is a deterministic mock reply streamed one chunk at a time.";

fn mock_engine(provider: MockProvider) -> Arc<ChatEngine> {
    ChatEngine::with_fixed_provider(SessionStore::in_memory(), ProviderSelection::Mock(provider))
        .expect("engine opens over an in-memory store")
}

fn settled(engine: &Arc<ChatEngine>, session_id: &str) -> bool {
    engine
        .get_session(session_id)
        .is_some_and(|session| !session.has_generating_message())
        && engine.active_generation(session_id).is_none()
}

#[test]
fn submit_streams_to_completion() {
    let engine = mock_engine(MockProvider::default());
    let session = engine.create_session().expect("session");

    engine
        .submit_user_message(&session.id, "hello there", true)
        .expect("submit accepted");

    assert!(
        wait_until(SETTLE_TIMEOUT, || settled(&engine, &session.id)),
        "generation did not settle"
    );

    let session = engine.get_session(&session.id).expect("session");
    assert_eq!(session.name, "hello there");
    assert_eq!(session.messages.len(), 2);

    let reply = &session.messages[1];
    assert_eq!(reply.content, MOCK_REPLY);
    assert!(!reply.generating);
    assert!(!reply.cancelled);
    assert!(reply.error.is_none());

    let usage = reply.usage.as_ref().expect("usage recorded");
    assert_eq!(usage.word_count, 13);
}

#[test]
fn finished_sessions_are_persisted() {
    let engine = mock_engine(MockProvider::default());
    let session = engine.create_session().expect("session");

    engine
        .submit_user_message(&session.id, "persist me", true)
        .expect("submit accepted");
    assert!(wait_until(SETTLE_TIMEOUT, || settled(&engine, &session.id)));

    let stored = engine
        .store()
        .load_session(&session.id)
        .expect("store readable")
        .expect("session persisted");
    assert_eq!(stored.messages[1].content, MOCK_REPLY);
    assert!(!stored.messages[1].generating);
}

#[test]
fn concurrent_submit_is_rejected_while_streaming() {
    let engine = mock_engine(MockProvider::default().with_hold_open());
    let session = engine.create_session().expect("session");

    engine
        .submit_user_message(&session.id, "first", true)
        .expect("submit accepted");

    assert!(wait_until(SETTLE_TIMEOUT, || {
        engine.active_generation(&session.id).is_some()
    }));

    let error = engine
        .submit_user_message(&session.id, "second", true)
        .expect_err("second submit must be rejected");
    assert!(matches!(error, EngineError::GenerationInFlight { .. }));

    engine.cancel_generation(&session.id);
    assert!(wait_until(SETTLE_TIMEOUT, || settled(&engine, &session.id)));

    // Only the first exchange exists; the rejected submit left no trace.
    let session = engine.get_session(&session.id).expect("session");
    assert_eq!(session.messages.len(), 2);
    assert_eq!(session.messages[0].content, "first");
}

#[test]
fn provider_failures_are_stored_on_the_message() {
    let provider = MockProvider::new(vec!["partial ".to_string(), "text".to_string()])
        .with_failure(GenerationError::http_status(
            429,
            "rate limited",
            "{\"error\":{\"message\":\"rate limited\"}}",
        ));
    let engine = mock_engine(provider);
    let session = engine.create_session().expect("session");

    engine
        .submit_user_message(&session.id, "please fail", true)
        .expect("submit accepted");
    assert!(wait_until(SETTLE_TIMEOUT, || settled(&engine, &session.id)));

    let session = engine.get_session(&session.id).expect("session");
    let reply = &session.messages[1];
    assert_eq!(reply.content, "partial text");
    assert!(!reply.cancelled);

    let error = reply.error.as_ref().expect("error stored");
    assert_eq!(error.kind, ErrorKind::HttpStatus);
    assert_eq!(error.status, Some(429));

    // A failed generation leaves the session ready for another attempt.
    engine
        .submit_user_message(&session.id, "try again", true)
        .expect("session accepts a new submit after failure");
    assert!(wait_until(SETTLE_TIMEOUT, || settled(&engine, &session.id)));
}

#[test]
fn submitting_without_a_provider_leaves_the_session_untouched() {
    let engine = ChatEngine::with_store(SessionStore::in_memory()).expect("engine");
    let session = engine.create_session().expect("session");

    let error = engine
        .submit_user_message(&session.id, "anyone there?", true)
        .expect_err("no provider configured");
    assert!(matches!(error, EngineError::NoProviderConfigured));

    let session = engine.get_session(&session.id).expect("session");
    assert!(session.messages.is_empty());
}

#[test]
fn submit_without_auto_generate_appends_only_the_user_turn() {
    let engine = mock_engine(MockProvider::default());
    let session = engine.create_session().expect("session");

    let generation = engine
        .submit_user_message(&session.id, "just noting this down", false)
        .expect("submit accepted");
    assert!(generation.is_none());

    let session = engine.get_session(&session.id).expect("session");
    assert_eq!(session.messages.len(), 1);
    assert_eq!(session.messages[0].content, "just noting this down");
    assert!(engine.active_generation(&session.id).is_none());
}

#[test]
fn unknown_session_is_reported() {
    let engine = mock_engine(MockProvider::default());
    let error = engine
        .submit_user_message("no-such-session", "hello", true)
        .expect_err("unknown session");
    assert!(matches!(error, EngineError::UnknownSession { .. }));
}

#[test]
fn chunk_pacing_surfaces_incremental_progress() {
    let provider = MockProvider::new(vec!["a ".to_string(), "b ".to_string(), "c".to_string()])
        .with_chunk_delay(Duration::from_millis(30));
    let engine = mock_engine(provider);
    let session = engine.create_session().expect("session");

    engine
        .submit_user_message(&session.id, "stream slowly", true)
        .expect("submit accepted");

    let saw_partial = wait_until(SETTLE_TIMEOUT, || {
        engine.get_session(&session.id).is_some_and(|session| {
            session
                .messages
                .get(1)
                .is_some_and(|reply| reply.generating && !reply.content.is_empty())
        })
    });
    assert!(saw_partial, "no partial content observed mid-stream");

    assert!(wait_until(SETTLE_TIMEOUT, || settled(&engine, &session.id)));
    let session = engine.get_session(&session.id).expect("session");
    assert_eq!(session.messages[1].content, "a b c");
}
