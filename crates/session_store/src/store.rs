use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::SessionStoreError;
use crate::schema::Session;

/// Key of the application settings document.
pub const SETTINGS_KEY: &str = "settings";

const SESSION_KEY_PREFIX: &str = "session:";

/// Flat key-to-JSON blob storage backing the document layer.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionStoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), SessionStoreError>;
    fn delete(&self, key: &str) -> Result<(), SessionStoreError>;
    fn keys(&self) -> Result<Vec<String>, SessionStoreError>;

    /// Snapshot of every stored document, for export and backup.
    fn export_all(&self) -> Result<BTreeMap<String, Value>, SessionStoreError>;
}

/// Single-file JSON store.
///
/// The whole map is rewritten on every mutation via a temp-file rename, so a
/// crash mid-write never leaves a truncated store behind.
pub struct FileStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, Value>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        let path = path.into();

        let cache = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|source| SessionStoreError::io("reading store file", &path, source))?;
            let value: Value = serde_json::from_str(&raw).map_err(|source| {
                SessionStoreError::StoreParse {
                    path: path.clone(),
                    source,
                }
            })?;
            match value {
                Value::Object(map) => map.into_iter().collect(),
                _ => return Err(SessionStoreError::InvalidStoreShape { path }),
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    fn persist(&self, cache: &BTreeMap<String, Value>) -> Result<(), SessionStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| SessionStoreError::io("creating store directory", parent, source))?;
        }

        let map: serde_json::Map<String, Value> =
            cache.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        let serialized = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(|source| SessionStoreError::document_serialize("<store>", source))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .map_err(|source| SessionStoreError::io("writing store file", &tmp_path, source))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|source| SessionStoreError::io("replacing store file", &self.path, source))?;

        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.cache).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionStoreError> {
        let mut cache = lock_unpoisoned(&self.cache);
        cache.insert(key.to_string(), value);
        self.persist(&cache)
    }

    fn delete(&self, key: &str) -> Result<(), SessionStoreError> {
        let mut cache = lock_unpoisoned(&self.cache);
        if cache.remove(key).is_some() {
            self.persist(&cache)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.cache).keys().cloned().collect())
    }

    fn export_all(&self) -> Result<BTreeMap<String, Value>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.cache).clone())
    }
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    cache: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.cache).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), SessionStoreError> {
        lock_unpoisoned(&self.cache).insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), SessionStoreError> {
        lock_unpoisoned(&self.cache).remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.cache).keys().cloned().collect())
    }

    fn export_all(&self) -> Result<BTreeMap<String, Value>, SessionStoreError> {
        Ok(lock_unpoisoned(&self.cache).clone())
    }
}

/// Typed document layer over a [`KvStore`].
pub struct SessionStore {
    kv: Box<dyn KvStore>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

impl SessionStore {
    #[must_use]
    pub fn new(kv: Box<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, SessionStoreError> {
        Ok(Self::new(Box::new(FileStore::open(path)?)))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }

    pub fn get_document<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, SessionStoreError> {
        match self.kv.get(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| SessionStoreError::document_parse(key, source)),
            None => Ok(None),
        }
    }

    pub fn set_document<T: Serialize>(
        &self,
        key: &str,
        document: &T,
    ) -> Result<(), SessionStoreError> {
        let value = serde_json::to_value(document)
            .map_err(|source| SessionStoreError::document_serialize(key, source))?;
        self.kv.set(key, value)
    }

    pub fn delete_document(&self, key: &str) -> Result<(), SessionStoreError> {
        self.kv.delete(key)
    }

    pub fn save_session(&self, session: &Session) -> Result<(), SessionStoreError> {
        self.set_document(&session_key(&session.id), session)
    }

    /// Loads one session.
    ///
    /// Runtime-only fields (`generating`) come back at their defaults, so a
    /// session interrupted mid-generation loads as idle.
    pub fn load_session(&self, session_id: &str) -> Result<Option<Session>, SessionStoreError> {
        self.get_document(&session_key(session_id))
    }

    pub fn delete_session(&self, session_id: &str) -> Result<(), SessionStoreError> {
        self.kv.delete(&session_key(session_id))
    }

    pub fn list_session_ids(&self) -> Result<Vec<String>, SessionStoreError> {
        Ok(self
            .kv
            .keys()?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(SESSION_KEY_PREFIX)
                    .map(|id| id.to_string())
            })
            .collect())
    }

    /// Loads every stored session, most recently updated first.
    pub fn load_all_sessions(&self) -> Result<Vec<Session>, SessionStoreError> {
        let mut sessions = Vec::new();
        for session_id in self.list_session_ids()? {
            if let Some(session) = self.load_session(&session_id)? {
                sessions.push(session);
            }
        }

        sessions.sort_by(|a, b| b.update_time.cmp(&a.update_time));
        Ok(sessions)
    }

    /// Snapshot of every stored document, for export and backup.
    pub fn export_all(&self) -> Result<BTreeMap<String, Value>, SessionStoreError> {
        self.kv.export_all()
    }
}

fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
