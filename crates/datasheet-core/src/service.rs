use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ExtractionSchema;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Unexpected service response: {0}")]
    Protocol(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Service error: {0}")]
    Other(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Reference to a file held by the extraction service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteArtifactHandle {
    /// Resource name, e.g. `files/abc123`.
    pub name: String,
    pub uri: String,
    pub mime_type: String,
}

impl RemoteArtifactHandle {
    #[must_use]
    pub fn new(name: impl Into<String>, uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }
}

impl std::fmt::Display for RemoteArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Hosted structured-extraction service.
///
/// Every call may fail; callers contain failures to the item being processed.
#[async_trait::async_trait]
pub trait ExtractionService: Send + Sync {
    async fn upload(&self, path: &Path, display_name: &str) -> ServiceResult<RemoteArtifactHandle>;

    /// Runs one schema-constrained request and returns the raw JSON text.
    async fn generate(
        &self,
        handle: &RemoteArtifactHandle,
        prompt: &str,
        schema: &ExtractionSchema,
    ) -> ServiceResult<String>;

    async fn delete(&self, handle: &RemoteArtifactHandle) -> ServiceResult<()>;
}
