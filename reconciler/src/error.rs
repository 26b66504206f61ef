use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{path:?} line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid policies in {path:?}: {}", .errors.join("; "))]
    Validation { path: PathBuf, errors: Vec<String> },

    #[error(transparent)]
    Authz(#[from] authz::AuthzError),

    #[error(transparent)]
    Database(#[from] database::DatabaseError),

    #[error(transparent)]
    Hierarchy(#[from] hierarchy::HierarchyError),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
