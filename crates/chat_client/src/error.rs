use std::path::PathBuf;

use catalog_store::CatalogError;
use chat_api::ChatApiError;
use chat_backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unsupported backend '{0}'; available backends: mock, http")]
    UnsupportedBackend(String),

    #[error("the http backend needs {0} to point at a JSON config file")]
    MissingConfig(&'static str),

    #[error("failed to read config {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config {path}: {message}")]
    InvalidConfig { path: PathBuf, message: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    ChatApi(#[from] ChatApiError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
