use std::io;
use std::path::PathBuf;

use pdd_formats::DecodeError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unresolved {kind} reference '{key}' ({context})")]
    UnresolvedReference {
        kind: &'static str,
        key: String,
        context: String,
    },

    #[error("data store: {0}")]
    Store(#[from] StoreError),

    #[error("bundle is missing {0}")]
    MissingFile(String),

    #[error("bundle root holds {count} executables; name one in the settings")]
    AmbiguousExecutable { count: usize },

    #[error("reading settings {path}: {source}")]
    Settings {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

impl ImportError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
