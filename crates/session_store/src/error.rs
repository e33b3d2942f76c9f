use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse stored JSON at {path}: {source}")]
    StoreParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored document under key '{key}' does not match its schema: {source}")]
    DocumentParse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize document for key '{key}': {source}")]
    DocumentSerialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store root at {path} is not a JSON object")]
    InvalidStoreShape { path: PathBuf },
}

impl SessionStoreError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn document_parse(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::DocumentParse {
            key: key.into(),
            source,
        }
    }

    #[must_use]
    pub fn document_serialize(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::DocumentSerialize {
            key: key.into(),
            source,
        }
    }
}
