use serde::{Deserialize, Serialize};
use session_store::{new_id, SessionStore, SessionStoreError};

/// Key of the stored copilot collection.
pub const COPILOTS_KEY: &str = "copilots";

/// A reusable system-prompt persona that can be attached to sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Copilot {
    pub id: String,
    pub name: String,
    pub prompt: String,
}

impl Copilot {
    #[must_use]
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

pub fn load_copilots(store: &SessionStore) -> Result<Vec<Copilot>, SessionStoreError> {
    Ok(store.get_document(COPILOTS_KEY)?.unwrap_or_default())
}

pub fn save_copilot(store: &SessionStore, copilot: Copilot) -> Result<(), SessionStoreError> {
    let mut copilots = load_copilots(store)?;
    match copilots.iter_mut().find(|entry| entry.id == copilot.id) {
        Some(existing) => *existing = copilot,
        None => copilots.push(copilot),
    }
    store.set_document(COPILOTS_KEY, &copilots)
}

pub fn delete_copilot(store: &SessionStore, copilot_id: &str) -> Result<(), SessionStoreError> {
    let mut copilots = load_copilots(store)?;
    copilots.retain(|entry| entry.id != copilot_id);
    store.set_document(COPILOTS_KEY, &copilots)
}
