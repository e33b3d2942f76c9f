//! Persistent conversation state for the chat engine.
//!
//! Sessions are stored as whole JSON documents in a key-value blob store.
//! The store makes no attempt at incremental persistence: a session is
//! rewritten in full on every save, which keeps crash recovery trivial at
//! the cost of write amplification on long conversations.

mod error;
mod paths;
mod schema;
mod store;

pub use error::SessionStoreError;
pub use paths::{store_file_path, store_root, STORE_FILE_NAME};
pub use schema::{
    new_id, now_ms, Message, MessageUsage, Session, SessionType, SCHEMA_VERSION,
};
pub use store::{FileStore, KvStore, MemoryStore, SessionStore, SETTINGS_KEY};
