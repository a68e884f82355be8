use thiserror::Error;

use crate::config::ConfigError;
use crate::export::ExportError;
use crate::extraction::ExtractionError;
use crate::schema::SchemaError;
use crate::service::ServiceError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Service error: {0}")]
    Service(#[from] ServiceError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
