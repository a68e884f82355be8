use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, DEFAULT_COOLDOWN_SECS};
use crate::export::{ExportError, ResultTable};
use crate::extraction::{ExtractionError, Extractor, DEFAULT_PROMPT};
use crate::record::{ExtractedRecord, UploadedFile};
use crate::schema::ExtractionSchema;
use crate::service::ExtractionService;
use crate::staging::{ArtifactStager, CleanupReport};

/// Delay policy applied between consecutive items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    Disabled,
    Fixed(Duration),
}

impl Pacing {
    #[must_use]
    pub const fn cooldown(&self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Fixed(d) => Some(*d),
        }
    }
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(DEFAULT_COOLDOWN_SECS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Staged,
    Uploaded,
    Extracted,
    Failed,
    Cleaned,
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("Could not stage file: {0}")]
    Staging(#[from] std::io::Error),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// User-facing notice for one failed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemWarning {
    pub index: usize,
    pub file: String,
    pub message: String,
}

impl std::fmt::Display for ItemWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to process {}: {}", self.file, self.message)
    }
}

#[derive(Debug)]
pub struct ItemReport {
    pub index: usize,
    pub file: String,
    pub states: Vec<ItemState>,
    pub error: Option<ItemError>,
    pub cleanup: CleanupReport,
}

impl ItemReport {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    Started { total: usize },
    ItemStarted { index: usize, total: usize, file: String },
    ItemWarning(ItemWarning),
    ItemFinished { completed: usize, total: usize, file: String, extracted: bool },
    CoolingDown { seconds: f64 },
    Finished { records: usize, failures: usize, total: usize },
}

impl BatchEvent {
    /// Human-readable status line for the UI.
    #[must_use]
    pub fn status_text(&self) -> String {
        match self {
            Self::Started { total } => format!("Processing {total} PDFs..."),
            Self::ItemStarted { index, total, file } => {
                format!("Extracting {file} ({}/{total})...", index + 1)
            }
            Self::ItemWarning(warning) => warning.to_string(),
            Self::ItemFinished { completed, total, file, .. } => {
                format!("Processed {file} ({completed}/{total})")
            }
            Self::CoolingDown { seconds } => format!("Waiting {seconds:.1}s before the next file..."),
            Self::Finished { records, .. } => summary_text(*records),
        }
    }
}

fn summary_text(records: usize) -> String {
    if records == 0 {
        "No data extracted".to_string()
    } else {
        format!("Batch extraction complete with {records} records")
    }
}

/// Receives batch events as they happen.
pub trait ProgressSink: Send {
    fn emit(&mut self, event: BatchEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(BatchEvent) + Send,
{
    fn emit(&mut self, event: BatchEvent) {
        self(event);
    }
}

/// Sink that drops every event.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: BatchEvent) {}
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub records: Vec<ExtractedRecord>,
    pub warnings: Vec<ItemWarning>,
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.warnings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn summary(&self) -> String {
        summary_text(self.records.len())
    }

    pub fn table(&self, schema: &ExtractionSchema) -> Result<ResultTable, ExportError> {
        ResultTable::build(&self.records, schema)
    }
}

/// Batch orchestrator. Runs every file through stage, extract and cleanup,
/// one at a time.
pub struct BatchRunner {
    service: Arc<dyn ExtractionService>,
    stager: ArtifactStager,
    schema: Arc<ExtractionSchema>,
    pacing: Pacing,
    prompt: String,
}

impl BatchRunner {
    #[must_use]
    pub fn new(
        service: Arc<dyn ExtractionService>,
        stager: ArtifactStager,
        schema: Arc<ExtractionSchema>,
    ) -> Self {
        Self {
            service,
            stager,
            schema,
            pacing: Pacing::default(),
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }

    #[must_use]
    pub fn from_config(
        config: &Config,
        service: Arc<dyn ExtractionService>,
        schema: Arc<ExtractionSchema>,
    ) -> Self {
        Self::new(service, ArtifactStager::new(&config.staging_dir), schema)
            .with_pacing(config.pacing())
    }

    #[must_use]
    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn schema(&self) -> &ExtractionSchema {
        &self.schema
    }

    #[must_use]
    pub const fn pacing(&self) -> Pacing {
        self.pacing
    }

    pub async fn run<P>(&self, files: &[UploadedFile], progress: &mut P) -> BatchReport
    where
        P: ProgressSink + ?Sized,
    {
        let total = files.len();
        let mut report = BatchReport {
            total,
            ..Default::default()
        };

        tracing::info!(total, schema = self.schema.name(), "starting batch");
        progress.emit(BatchEvent::Started { total });

        for (index, file) in files.iter().enumerate() {
            progress.emit(BatchEvent::ItemStarted {
                index,
                total,
                file: file.name.clone(),
            });

            let (result, item) = self.process_item(index, file).await;

            let extracted = match result {
                Ok(record) => {
                    report.records.push(record);
                    true
                }
                Err(message) => {
                    let warning = ItemWarning {
                        index,
                        file: file.name.clone(),
                        message,
                    };
                    tracing::warn!("{warning}");
                    progress.emit(BatchEvent::ItemWarning(warning.clone()));
                    report.warnings.push(warning);
                    false
                }
            };
            report.items.push(item);

            progress.emit(BatchEvent::ItemFinished {
                completed: index + 1,
                total,
                file: file.name.clone(),
                extracted,
            });

            if index + 1 < total {
                if let Some(cooldown) = self.pacing.cooldown() {
                    progress.emit(BatchEvent::CoolingDown {
                        seconds: cooldown.as_secs_f64(),
                    });
                    tokio::time::sleep(cooldown).await;
                }
            }
        }

        tracing::info!(
            records = report.success_count(),
            failures = report.failure_count(),
            "{}",
            report.summary()
        );
        progress.emit(BatchEvent::Finished {
            records: report.success_count(),
            failures: report.failure_count(),
            total,
        });

        report
    }

    /// Runs the per-item pipeline. Cleanup executes exactly once on every path.
    async fn process_item(
        &self,
        index: usize,
        file: &UploadedFile,
    ) -> (Result<ExtractedRecord, String>, ItemReport) {
        let service = self.service.as_ref();
        let mut states = Vec::with_capacity(4);

        let artifact = match self.stager.stage(file).await {
            Ok(artifact) => {
                transition(&mut states, &file.name, ItemState::Staged);
                artifact
            }
            Err(e) => {
                transition(&mut states, &file.name, ItemState::Failed);
                let cleanup = self.stager.release(None, None, service).await;
                transition(&mut states, &file.name, ItemState::Cleaned);

                let error = ItemError::Staging(e);
                let message = error.to_string();
                return (
                    Err(message),
                    ItemReport {
                        index,
                        file: file.name.clone(),
                        states,
                        error: Some(error),
                        cleanup,
                    },
                );
            }
        };

        let attempt = Extractor::new(service, &self.prompt)
            .extract(artifact.path(), &file.name, &self.schema)
            .await;

        if attempt.remote.is_some() {
            transition(&mut states, &file.name, ItemState::Uploaded);
        }

        let (result, error) = match attempt.result {
            Ok(fields) => {
                transition(&mut states, &file.name, ItemState::Extracted);
                (Ok(ExtractedRecord::new(file.name.clone(), fields)), None)
            }
            Err(e) => {
                transition(&mut states, &file.name, ItemState::Failed);
                let error = ItemError::Extraction(e);
                (Err(error.to_string()), Some(error))
            }
        };

        let cleanup = self
            .stager
            .release(Some(artifact), attempt.remote, service)
            .await;
        transition(&mut states, &file.name, ItemState::Cleaned);

        (
            result,
            ItemReport {
                index,
                file: file.name.clone(),
                states,
                error,
                cleanup,
            },
        )
    }
}

fn transition(states: &mut Vec<ItemState>, file: &str, next: ItemState) {
    tracing::debug!(file, from = ?states.last(), to = ?next, "item state");
    states.push(next);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pacing() {
        assert_eq!(Pacing::Disabled.cooldown(), None);
        assert_eq!(
            Pacing::Fixed(Duration::from_millis(500)).cooldown(),
            Some(Duration::from_millis(500))
        );
        assert_eq!(Pacing::default(), Pacing::Fixed(Duration::from_secs(2)));
    }

    #[test]
    fn test_status_text() {
        let event = BatchEvent::ItemFinished {
            completed: 2,
            total: 3,
            file: "b.pdf".into(),
            extracted: true,
        };
        assert_eq!(event.status_text(), "Processed b.pdf (2/3)");

        let event = BatchEvent::ItemStarted {
            index: 0,
            total: 3,
            file: "a.pdf".into(),
        };
        assert_eq!(event.status_text(), "Extracting a.pdf (1/3)...");

        assert_eq!(
            BatchEvent::Finished { records: 0, failures: 2, total: 2 }.status_text(),
            "No data extracted"
        );
        assert_eq!(
            BatchEvent::Finished { records: 4, failures: 0, total: 4 }.status_text(),
            "Batch extraction complete with 4 records"
        );
    }

    #[test]
    fn test_warning_names_file() {
        let warning = ItemWarning {
            index: 1,
            file: "pump.pdf".into(),
            message: "Generation failed: timeout".into(),
        };
        assert_eq!(
            warning.to_string(),
            "Failed to process pump.pdf: Generation failed: timeout"
        );
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(BatchEvent::Started { total: 3 }).unwrap();
        assert_eq!(json["event"], "started");
        assert_eq!(json["total"], 3);
    }

    #[test]
    fn test_closure_is_a_sink() {
        let mut seen = Vec::new();
        {
            let mut sink = |event: BatchEvent| seen.push(event);
            sink.emit(BatchEvent::Started { total: 1 });
        }
        assert_eq!(seen, vec![BatchEvent::Started { total: 1 }]);
    }
}
