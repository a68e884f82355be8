pub mod batch;
pub mod config;
pub mod error;
pub mod export;
pub mod extraction;
pub mod gemini;
pub mod record;
pub mod schema;
pub mod service;
pub mod staging;

pub use batch::{
    BatchEvent, BatchReport, BatchRunner, ItemError, ItemReport, ItemState, ItemWarning,
    NoProgress, Pacing, ProgressSink,
};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use export::{ExportError, ResultTable, CSV_FILE_NAME, CSV_MIME};
pub use extraction::{ExtractionAttempt, ExtractionError, Extractor, DEFAULT_PROMPT};
pub use gemini::GeminiClient;
pub use record::{ExtractedFields, ExtractedRecord, FieldValue, UploadedFile, SOURCE_FILE_COLUMN};
pub use schema::{ExtractionSchema, FieldType, SchemaError, SchemaField};
pub use service::{ExtractionService, RemoteArtifactHandle, ServiceError, ServiceResult};
pub use staging::{ArtifactStager, CleanupReport, CleanupTarget, CleanupWarning, StagedArtifact};
