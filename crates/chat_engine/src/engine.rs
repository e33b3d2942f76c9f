use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use chat_provider::{
    CancelSignal, CompletionRequest, ErrorKind, GenerationError, GenerationEvent, GenerationId,
    ModelEntry,
};
use session_store::{now_ms, store_file_path, MessageUsage, Session, SessionStore};
use tracing::{debug, warn};

use crate::copilot::load_copilots;
use crate::error::EngineError;
use crate::platform::{user_agent, Platform};
use crate::providers::ProviderSelection;
use crate::session;
use crate::settings::Settings;

struct ActiveGeneration {
    generation_id: GenerationId,
    message_id: String,
    cancel: CancelSignal,
    join_handle: Option<JoinHandle<()>>,
}

/// Orchestrates sessions, providers, and generation workers.
///
/// Lock ordering is `sessions`, then `settings`, then `active`. Generation
/// events are applied directly under the sessions lock; terminal events
/// additionally persist the session and retire the worker.
pub struct ChatEngine {
    store: SessionStore,
    sessions: Mutex<HashMap<String, Session>>,
    settings: Mutex<Settings>,
    active: Mutex<HashMap<String, ActiveGeneration>>,
    next_generation_id: AtomicU64,
    user_agent: String,
    fixed_provider: Option<Arc<ProviderSelection>>,
}

impl ChatEngine {
    /// Opens the engine against the platform's config directory.
    pub fn open(platform: &dyn Platform) -> Result<Arc<Self>, EngineError> {
        let store = SessionStore::open_file(store_file_path(platform.config_dir()))?;
        Self::from_store(store, user_agent(platform), None)
    }

    /// Builds an engine over an existing store, resolving providers from
    /// settings per generation.
    pub fn with_store(store: SessionStore) -> Result<Arc<Self>, EngineError> {
        let agent = format!("chat-engine/{}", env!("CARGO_PKG_VERSION"));
        Self::from_store(store, agent, None)
    }

    /// Builds an engine that drives every generation through `provider`,
    /// ignoring configured providers. Useful for local mock runs and tests.
    pub fn with_fixed_provider(
        store: SessionStore,
        provider: ProviderSelection,
    ) -> Result<Arc<Self>, EngineError> {
        let agent = format!("chat-engine/{}", env!("CARGO_PKG_VERSION"));
        Self::from_store(store, agent, Some(Arc::new(provider)))
    }

    fn from_store(
        store: SessionStore,
        user_agent: String,
        fixed_provider: Option<Arc<ProviderSelection>>,
    ) -> Result<Arc<Self>, EngineError> {
        let mut sessions = HashMap::new();
        for session in store.load_all_sessions()? {
            sessions.insert(session.id.clone(), session);
        }
        let settings = Settings::load(&store);

        Ok(Arc::new(Self {
            store,
            sessions: Mutex::new(sessions),
            settings: Mutex::new(settings),
            active: Mutex::new(HashMap::new()),
            next_generation_id: AtomicU64::new(1),
            user_agent,
            fixed_provider,
        }))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn create_session(&self) -> Result<Session, EngineError> {
        let session = Session::new("New chat");
        self.store.save_session(&session)?;
        lock_unpoisoned(&self.sessions).insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "session created");
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        lock_unpoisoned(&self.sessions).get(session_id).cloned()
    }

    /// Returns all sessions, most recently updated first.
    pub fn list_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> =
            lock_unpoisoned(&self.sessions).values().cloned().collect();
        sessions.sort_by(|a, b| b.update_time.cmp(&a.update_time));
        sessions
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), EngineError> {
        self.cancel_generation(session_id);
        lock_unpoisoned(&self.active).remove(session_id);

        let removed = lock_unpoisoned(&self.sessions).remove(session_id);
        if removed.is_none() {
            return Err(EngineError::UnknownSession {
                session_id: session_id.to_string(),
            });
        }

        self.store.delete_session(session_id)?;
        debug!(session_id = %session_id, "session deleted");
        Ok(())
    }

    /// Appends a user turn and, with `auto_generate`, starts a generation
    /// for the reply.
    ///
    /// Rejected with [`EngineError::GenerationInFlight`] while a previous
    /// generation in the same session is still streaming.
    pub fn submit_user_message(
        self: &Arc<Self>,
        session_id: &str,
        text: &str,
        auto_generate: bool,
    ) -> Result<Option<GenerationId>, EngineError> {
        let staged = {
            let mut sessions = lock_unpoisoned(&self.sessions);
            let session =
                sessions
                    .get_mut(session_id)
                    .ok_or_else(|| EngineError::UnknownSession {
                        session_id: session_id.to_string(),
                    })?;
            self.ensure_idle(session_id, session)?;

            if auto_generate {
                let provider = self.resolve_provider(session)?;
                session::append_user_turn(session, text);
                let pending_id = session::append_pending_assistant(session);
                let prompt = self.system_prompt(session);
                let history =
                    session::completion_history(session, &pending_id, prompt.as_deref());
                // Registered before the sessions lock drops, so anyone who can
                // observe the generating message can also cancel it.
                let (generation_id, cancel) = self.register_active(session_id, pending_id);
                Some((generation_id, cancel, history, provider))
            } else {
                session::append_user_turn(session, text);
                None
            }
        };

        match staged {
            Some((generation_id, cancel, history, provider)) => {
                if let Err(error) = self.persist_session(session_id) {
                    self.abort_generation_start(session_id, generation_id);
                    return Err(error);
                }
                self.start_generation(session_id, generation_id, cancel, history, provider)
                    .map(Some)
            }
            None => {
                self.persist_session(session_id)?;
                Ok(None)
            }
        }
    }

    /// Discards an assistant reply into a branch and generates a new one.
    pub fn regenerate_message(
        self: &Arc<Self>,
        session_id: &str,
        message_id: &str,
    ) -> Result<GenerationId, EngineError> {
        let (generation_id, cancel, history, provider) = {
            let mut sessions = lock_unpoisoned(&self.sessions);
            let session =
                sessions
                    .get_mut(session_id)
                    .ok_or_else(|| EngineError::UnknownSession {
                        session_id: session_id.to_string(),
                    })?;
            self.ensure_idle(session_id, session)?;
            let provider = self.resolve_provider(session)?;

            let pending_id = session::begin_regeneration(session, message_id).ok_or_else(|| {
                EngineError::UnknownMessage {
                    session_id: session_id.to_string(),
                    message_id: message_id.to_string(),
                }
            })?;
            let prompt = self.system_prompt(session);
            let history = session::completion_history(session, &pending_id, prompt.as_deref());
            let (generation_id, cancel) = self.register_active(session_id, pending_id);
            (generation_id, cancel, history, provider)
        };

        if let Err(error) = self.persist_session(session_id) {
            self.abort_generation_start(session_id, generation_id);
            return Err(error);
        }
        self.start_generation(session_id, generation_id, cancel, history, provider)
    }

    pub fn edit_message(
        &self,
        session_id: &str,
        message_id: &str,
        content: &str,
    ) -> Result<(), EngineError> {
        {
            let mut sessions = lock_unpoisoned(&self.sessions);
            let session =
                sessions
                    .get_mut(session_id)
                    .ok_or_else(|| EngineError::UnknownSession {
                        session_id: session_id.to_string(),
                    })?;
            self.ensure_idle(session_id, session)?;

            if !session::edit_message_content(session, message_id, content) {
                return Err(EngineError::UnknownMessage {
                    session_id: session_id.to_string(),
                    message_id: message_id.to_string(),
                });
            }
        }

        self.persist_session(session_id)
    }

    /// Flags the active generation for cancellation. A no-op when nothing is
    /// streaming, and safe to call repeatedly.
    pub fn cancel_generation(&self, session_id: &str) {
        let active = lock_unpoisoned(&self.active);
        if let Some(generation) = active.get(session_id) {
            debug!(
                session_id = %session_id,
                generation_id = generation.generation_id,
                "cancellation requested"
            );
            generation.cancel.store(true, Ordering::SeqCst);
        }
    }

    /// The generation currently streaming into `session_id`, if any.
    pub fn active_generation(&self, session_id: &str) -> Option<GenerationId> {
        lock_unpoisoned(&self.active)
            .get(session_id)
            .map(|generation| generation.generation_id)
    }

    pub fn set_session_provider(
        &self,
        session_id: &str,
        provider_id: Option<String>,
        model: Option<String>,
    ) -> Result<(), EngineError> {
        self.update_session(session_id, |session| {
            session.provider_id = provider_id;
            session.model = model;
        })
    }

    pub fn set_session_copilot(
        &self,
        session_id: &str,
        copilot_id: Option<String>,
    ) -> Result<(), EngineError> {
        self.update_session(session_id, |session| {
            session.copilot_id = copilot_id;
        })
    }

    pub fn rename_session(&self, session_id: &str, name: &str) -> Result<(), EngineError> {
        self.update_session(session_id, |session| {
            session.name = name.to_string();
        })
    }

    pub fn settings(&self) -> Settings {
        lock_unpoisoned(&self.settings).clone()
    }

    pub fn update_settings(
        &self,
        apply: impl FnOnce(&mut Settings),
    ) -> Result<(), EngineError> {
        let snapshot = {
            let mut settings = lock_unpoisoned(&self.settings);
            apply(&mut settings);
            settings.clone()
        };
        snapshot.save(&self.store)?;
        Ok(())
    }

    /// Fetches the model list for a configured provider and caches it in
    /// settings.
    pub fn refresh_models(&self, provider_uuid: &str) -> Result<Vec<ModelEntry>, EngineError> {
        let provider = {
            let settings = lock_unpoisoned(&self.settings);
            let entry =
                settings
                    .provider(provider_uuid)
                    .ok_or_else(|| EngineError::UnknownProvider {
                        provider_id: provider_uuid.to_string(),
                    })?;
            ProviderSelection::for_model_listing(entry, Some(&self.user_agent))?
        };

        let models = provider.list_models().map_err(EngineError::ModelListing)?;

        self.update_settings(|settings| {
            if let Some(entry) = settings.provider_mut(provider_uuid) {
                entry.model_list = models.clone();
                entry.last_updated_model = Some(now_ms());
            }
        })?;

        Ok(models)
    }

    fn ensure_idle(&self, session_id: &str, session: &Session) -> Result<(), EngineError> {
        let streaming = session.has_generating_message()
            || lock_unpoisoned(&self.active).contains_key(session_id);
        if streaming {
            return Err(EngineError::GenerationInFlight {
                session_id: session_id.to_string(),
            });
        }
        Ok(())
    }

    fn resolve_provider(&self, session: &Session) -> Result<Arc<ProviderSelection>, EngineError> {
        if let Some(provider) = &self.fixed_provider {
            return Ok(Arc::clone(provider));
        }

        let settings = lock_unpoisoned(&self.settings);
        ProviderSelection::from_settings(&settings, session, Some(&self.user_agent)).map(Arc::new)
    }

    /// The bound copilot's prompt, or the settings-level default prompt.
    fn system_prompt(&self, session: &Session) -> Option<String> {
        if let Some(copilot_id) = session.copilot_id.as_deref() {
            match load_copilots(&self.store) {
                Ok(copilots) => {
                    let prompt = copilots
                        .into_iter()
                        .find(|copilot| copilot.id == copilot_id)
                        .map(|copilot| copilot.prompt);
                    if prompt.is_some() {
                        return prompt;
                    }
                }
                Err(error) => {
                    warn!(copilot_id = %copilot_id, %error, "failed to load copilots");
                }
            }
        }

        lock_unpoisoned(&self.settings).default_prompt.clone()
    }

    /// Allocates a generation id and claims the session's active slot.
    ///
    /// Callers hold the sessions lock, so the generating message and its
    /// cancel handle become visible together.
    fn register_active(&self, session_id: &str, message_id: String) -> (GenerationId, CancelSignal) {
        let generation_id = self.next_generation_id.fetch_add(1, Ordering::SeqCst);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));

        lock_unpoisoned(&self.active).insert(
            session_id.to_string(),
            ActiveGeneration {
                generation_id,
                message_id,
                cancel: Arc::clone(&cancel),
                join_handle: None,
            },
        );

        (generation_id, cancel)
    }

    fn start_generation(
        self: &Arc<Self>,
        session_id: &str,
        generation_id: GenerationId,
        cancel: CancelSignal,
        history: Vec<chat_provider::ChatMessage>,
        provider: Arc<ProviderSelection>,
    ) -> Result<GenerationId, EngineError> {
        let request = CompletionRequest {
            generation_id,
            messages: history,
        };

        match self.spawn_worker(session_id.to_string(), request, cancel, provider) {
            Ok(join_handle) => {
                let mut active = lock_unpoisoned(&self.active);
                if let Some(generation) = active.get_mut(session_id) {
                    // The worker may already have retired the entry.
                    if generation.generation_id == generation_id {
                        generation.join_handle = Some(join_handle);
                    }
                }
                debug!(session_id = %session_id, generation_id, "generation started");
                Ok(generation_id)
            }
            Err(error) => {
                self.abort_generation_start(session_id, generation_id);
                Err(error)
            }
        }
    }

    /// Retires a generation whose worker never ran, so the session is not
    /// left generating with nothing driving it.
    fn abort_generation_start(&self, session_id: &str, generation_id: GenerationId) {
        let removed = {
            let mut active = lock_unpoisoned(&self.active);
            match active.get(session_id) {
                Some(generation) if generation.generation_id == generation_id => {
                    active.remove(session_id)
                }
                _ => None,
            }
        };
        let Some(generation) = removed else {
            return;
        };

        {
            let mut sessions = lock_unpoisoned(&self.sessions);
            if let Some(session) = sessions.get_mut(session_id) {
                session::finalize_failure(
                    session,
                    &generation.message_id,
                    worker_failure("generation worker failed to start".to_string()),
                );
            }
        }

        if let Err(error) = self.persist_session(session_id) {
            warn!(session_id = %session_id, %error, "failed to persist session");
        }
    }

    fn spawn_worker(
        self: &Arc<Self>,
        session_id: String,
        request: CompletionRequest,
        cancel: CancelSignal,
        provider: Arc<ProviderSelection>,
    ) -> Result<JoinHandle<()>, EngineError> {
        let generation_id = request.generation_id;
        let engine = Arc::clone(self);
        thread::Builder::new()
            .name(format!("chat-generation-{generation_id}"))
            .spawn(move || engine.run_worker(session_id, request, cancel, provider))
            .map_err(|error| EngineError::WorkerSpawn(error.to_string()))
    }

    fn run_worker(
        self: Arc<Self>,
        session_id: String,
        request: CompletionRequest,
        cancel: CancelSignal,
        provider: Arc<ProviderSelection>,
    ) {
        let generation_id = request.generation_id;
        let started = Instant::now();

        let terminal_emitted = Arc::new(AtomicBool::new(false));
        let terminal_emitted_for_emit = Arc::clone(&terminal_emitted);
        let engine = Arc::clone(&self);
        let emit_session_id = session_id.clone();
        let mut emit = move |event: GenerationEvent| {
            if event.is_terminal() {
                terminal_emitted_for_emit.store(true, Ordering::SeqCst);
            }

            engine.apply_event(&emit_session_id, event, started);
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            provider.complete(request, Arc::clone(&cancel), &mut emit)
        }));

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(message)) => emit(GenerationEvent::Failed {
                generation_id,
                error: worker_failure(message),
            }),
            Err(_) => emit(GenerationEvent::Failed {
                generation_id,
                error: worker_failure("provider panicked".to_string()),
            }),
        }

        if !terminal_emitted.load(Ordering::SeqCst)
            && self.is_active_generation(&session_id, generation_id)
        {
            emit(GenerationEvent::Failed {
                generation_id,
                error: worker_failure("provider exited without a terminal event".to_string()),
            });
        }
    }

    fn apply_event(&self, session_id: &str, event: GenerationEvent, started: Instant) {
        let generation_id = event.generation_id();
        let terminal = event.is_terminal();

        let Some(message_id) = self.active_message_id(session_id, generation_id) else {
            debug!(session_id = %session_id, generation_id, "dropping stale generation event");
            return;
        };

        {
            let mut sessions = lock_unpoisoned(&self.sessions);
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };

            match event {
                GenerationEvent::Started { .. } => {}
                GenerationEvent::Progress { content, .. } => {
                    session::apply_progress(session, &message_id, &content);
                }
                GenerationEvent::Finished { content, .. } => {
                    let visible = session::strip_reasoning(&content);
                    let usage = MessageUsage {
                        word_count: visible.split_whitespace().count() as u32,
                        token_count: None,
                        generation_ms: started.elapsed().as_millis() as u64,
                    };
                    session::finalize_success(session, &message_id, content, usage);
                }
                GenerationEvent::Failed { error, .. } => {
                    warn!(session_id = %session_id, generation_id, %error, "generation failed");
                    session::finalize_failure(session, &message_id, error);
                }
                GenerationEvent::Cancelled { .. } => {
                    debug!(session_id = %session_id, generation_id, "generation cancelled");
                    session::finalize_cancelled(session, &message_id);
                }
            }
        }

        if terminal {
            if let Err(error) = self.persist_session(session_id) {
                warn!(session_id = %session_id, %error, "failed to persist session");
            }
            self.clear_active_if_matching(session_id, generation_id);
        }
    }

    fn persist_session(&self, session_id: &str) -> Result<(), EngineError> {
        let snapshot = lock_unpoisoned(&self.sessions).get(session_id).cloned();
        if let Some(session) = snapshot {
            self.store.save_session(&session)?;
        }
        Ok(())
    }

    fn update_session(
        &self,
        session_id: &str,
        apply: impl FnOnce(&mut Session),
    ) -> Result<(), EngineError> {
        {
            let mut sessions = lock_unpoisoned(&self.sessions);
            let session =
                sessions
                    .get_mut(session_id)
                    .ok_or_else(|| EngineError::UnknownSession {
                        session_id: session_id.to_string(),
                    })?;
            apply(session);
            session.touch();
        }

        self.persist_session(session_id)
    }

    fn active_message_id(
        &self,
        session_id: &str,
        generation_id: GenerationId,
    ) -> Option<String> {
        let active = lock_unpoisoned(&self.active);
        let generation = active.get(session_id)?;
        (generation.generation_id == generation_id).then(|| generation.message_id.clone())
    }

    fn is_active_generation(&self, session_id: &str, generation_id: GenerationId) -> bool {
        lock_unpoisoned(&self.active)
            .get(session_id)
            .map(|generation| generation.generation_id)
            == Some(generation_id)
    }

    fn clear_active_if_matching(&self, session_id: &str, generation_id: GenerationId) {
        let mut active = lock_unpoisoned(&self.active);
        let matches = active
            .get(session_id)
            .map(|generation| generation.generation_id)
            == Some(generation_id);
        if !matches {
            return;
        }

        let Some(mut completed) = active.remove(session_id) else {
            return;
        };

        if let Some(join_handle) = completed.join_handle.take() {
            let is_current_thread = join_handle.thread().id() == thread::current().id();
            if !is_current_thread && join_handle.is_finished() {
                let _ = join_handle.join();
            }
        }
    }
}

fn worker_failure(message: String) -> GenerationError {
    GenerationError {
        kind: ErrorKind::Provider,
        message,
        status: None,
        payload: None,
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
