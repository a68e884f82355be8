use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use datasheet_core::{
    BatchEvent, BatchRunner, Config, ExportError, ExtractionSchema, ExtractionService,
    GeminiClient, ItemWarning, ResultTable, UploadedFile,
};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::config::ServerConfig;

/// Unique identifier for a submitted batch
pub type JobId = Uuid;

/// Finished jobs kept in memory before the oldest are evicted
const MAX_FINISHED_JOBS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Complete,
    Empty,
    /// The batch task died before producing a report
    Failed,
}

/// One batch submitted through the upload page
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    pub total: usize,
    pub completed: usize,
    pub status_text: String,
    pub warnings: Vec<ItemWarning>,
    pub table: Option<ResultTable>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(total: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: JobState::Running,
            total,
            completed: 0,
            status_text: format!("Processing {total} PDFs..."),
            warnings: Vec::new(),
            table: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    fn apply(&mut self, event: &BatchEvent) {
        match event {
            BatchEvent::ItemWarning(warning) => self.warnings.push(warning.clone()),
            BatchEvent::ItemFinished { completed, .. } => {
                self.completed = self.completed.max(*completed);
            }
            _ => {}
        }
        self.status_text = event.status_text();
    }

    #[must_use]
    pub fn summary(&self) -> String {
        match (&self.state, &self.table) {
            (JobState::Running, _) => self.status_text.clone(),
            (JobState::Failed, _) => format!(
                "Batch stopped: {}. No data extracted",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            (_, Some(table)) => format!("Batch extraction complete with {} records", table.len()),
            (_, None) => "No data extracted".to_string(),
        }
    }
}

/// Tracks every batch submitted during this process's lifetime
pub struct JobManager {
    jobs: HashMap<JobId, Job>,
    /// Finished job ids, oldest first
    finished: VecDeque<JobId>,
}

impl JobManager {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            finished: VecDeque::new(),
        }
    }

    pub fn create(&mut self, total: usize) -> JobId {
        self.evict_finished();
        let job = Job::new(total);
        let id = job.id;
        self.jobs.insert(id, job);
        id
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn record_event(&mut self, id: JobId, event: &BatchEvent) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.apply(event);
        }
    }

    pub fn finish(&mut self, id: JobId, table: Result<ResultTable, ExportError>) {
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };

        match table {
            Ok(table) => {
                job.state = JobState::Complete;
                job.table = Some(table);
            }
            Err(ExportError::NothingExtracted) => job.state = JobState::Empty,
            Err(e) => {
                tracing::error!(job = %id, "Failed to build result table: {e}");
                job.state = JobState::Empty;
            }
        }
        job.completed = job.total;
        self.mark_finished(id);
    }

    /// Ends a job whose batch task never produced a report.
    pub fn fail(&mut self, id: JobId, error: impl Into<String>) {
        let Some(job) = self.jobs.get_mut(&id) else {
            return;
        };

        job.state = JobState::Failed;
        job.error = Some(error.into());
        job.table = None;
        self.mark_finished(id);
    }

    fn mark_finished(&mut self, id: JobId) {
        if let Some(job) = self.jobs.get_mut(&id) {
            job.status_text = job.summary();
            job.finished_at = Some(Utc::now());
            self.finished.push_back(id);
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    fn evict_finished(&mut self) {
        while self.finished.len() >= MAX_FINISHED_JOBS {
            if let Some(id) = self.finished.pop_front() {
                self.jobs.remove(&id);
            }
        }
    }
}

impl Default for JobManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<RwLock<JobManager>>,
    pub runner: Arc<BatchRunner>,
    pub schema: Arc<ExtractionSchema>,
    pub config: ServerConfig,
    pub model: String,
    pub cooldown_seconds: u64,
}

impl AppState {
    /// Reads the extraction config and connects to the Gemini API.
    ///
    /// Fails before anything is processed when the API key is missing.
    pub fn from_env(config: ServerConfig) -> datasheet_core::Result<Self> {
        let extraction = Config::from_env()?;
        let client = GeminiClient::new(&extraction)?;
        Ok(Self::with_service(&extraction, Arc::new(client), config))
    }

    pub fn with_service(
        extraction: &Config,
        service: Arc<dyn ExtractionService>,
        config: ServerConfig,
    ) -> Self {
        let schema = Arc::new(ExtractionSchema::compressor_specs());
        let runner = BatchRunner::from_config(extraction, service, Arc::clone(&schema));

        Self {
            jobs: Arc::new(RwLock::new(JobManager::new())),
            runner: Arc::new(runner),
            schema,
            config,
            model: extraction.model.clone(),
            cooldown_seconds: extraction.cooldown.as_secs(),
        }
    }

    /// Registers a job and runs the batch on a background task.
    pub async fn submit(&self, files: Vec<UploadedFile>) -> (JobId, usize) {
        let total = files.len();
        let id = {
            let mut jobs = self.jobs.write().await;
            let id = jobs.create(total);
            tracing::debug!(job = %id, tracked = jobs.len(), "Registered batch");
            id
        };

        let jobs = Arc::clone(&self.jobs);
        let runner = Arc::clone(&self.runner);

        tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<BatchEvent>();

            let forward_jobs = Arc::clone(&jobs);
            let forwarder = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    forward_jobs.write().await.record_event(id, &event);
                }
            });

            let batch_runner = Arc::clone(&runner);
            let batch = tokio::spawn(async move {
                let mut sink = |event: BatchEvent| {
                    let _ = tx.send(event);
                };
                let report = batch_runner.run(&files, &mut sink).await;
                report
            });

            // Ending the batch task drops the sender and ends the forwarder
            let outcome = batch.await;
            if let Err(e) = forwarder.await {
                tracing::error!(job = %id, "Progress forwarder stopped: {e}");
            }

            match outcome {
                Ok(report) => {
                    let table = report.table(runner.schema());
                    jobs.write().await.finish(id, table);
                    tracing::info!(job = %id, "{}", report.summary());
                }
                Err(e) => {
                    tracing::error!(job = %id, "Batch task failed: {e}");
                    jobs.write().await.fail(id, e.to_string());
                }
            }
        });

        (id, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datasheet_core::{ExtractedFields, ExtractedRecord, FieldValue};

    fn table(rows: usize) -> ResultTable {
        let records: Vec<_> = (0..rows)
            .map(|i| {
                let mut fields = ExtractedFields::new();
                fields.insert("model_name".into(), FieldValue::Text(format!("M{i}")));
                fields.insert("pros_and_cons_summary".into(), FieldValue::Text("ok".into()));
                ExtractedRecord::new(format!("{i}.pdf"), fields)
            })
            .collect();
        ResultTable::build(&records, &ExtractionSchema::compressor_specs()).unwrap()
    }

    #[test]
    fn test_job_tracks_progress_and_warnings() {
        let mut manager = JobManager::new();
        let id = manager.create(2);

        manager.record_event(
            id,
            &BatchEvent::ItemWarning(ItemWarning {
                index: 0,
                file: "a.pdf".into(),
                message: "boom".into(),
            }),
        );
        manager.record_event(
            id,
            &BatchEvent::ItemFinished {
                completed: 1,
                total: 2,
                file: "a.pdf".into(),
                extracted: false,
            },
        );

        let job = manager.get(id).unwrap();
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.completed, 1);
        assert_eq!(job.warnings.len(), 1);
        assert_eq!(job.status_text, "Processed a.pdf (1/2)");
    }

    #[test]
    fn test_finish_states() {
        let mut manager = JobManager::new();

        let full = manager.create(3);
        manager.finish(full, Ok(table(3)));
        let job = manager.get(full).unwrap();
        assert_eq!(job.state, JobState::Complete);
        assert_eq!(job.completed, 3);
        assert_eq!(job.summary(), "Batch extraction complete with 3 records");

        let empty = manager.create(1);
        manager.finish(empty, Err(ExportError::NothingExtracted));
        let job = manager.get(empty).unwrap();
        assert_eq!(job.state, JobState::Empty);
        assert!(job.table.is_none());
        assert_eq!(job.status_text, "No data extracted");
    }

    #[test]
    fn test_failed_job_is_finished_and_evictable() {
        let mut manager = JobManager::new();
        let id = manager.create(2);

        manager.fail(id, "task 7 panicked");

        let job = manager.get(id).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.finished_at.is_some());
        assert!(job.table.is_none());
        assert_eq!(job.status_text, "Batch stopped: task 7 panicked. No data extracted");
        assert_eq!(manager.finished.front(), Some(&id));
    }

    struct PanickingService;

    #[async_trait::async_trait]
    impl ExtractionService for PanickingService {
        async fn upload(
            &self,
            _path: &std::path::Path,
            _display_name: &str,
        ) -> datasheet_core::ServiceResult<datasheet_core::RemoteArtifactHandle> {
            panic!("upload exploded");
        }

        async fn generate(
            &self,
            _handle: &datasheet_core::RemoteArtifactHandle,
            _prompt: &str,
            _schema: &ExtractionSchema,
        ) -> datasheet_core::ServiceResult<String> {
            unreachable!("upload never succeeds")
        }

        async fn delete(
            &self,
            _handle: &datasheet_core::RemoteArtifactHandle,
        ) -> datasheet_core::ServiceResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_panicking_batch_reaches_failed_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = crate::api::testing::state_with(dir.path(), Arc::new(PanickingService));

        let (id, total) = state
            .submit(vec![UploadedFile::new("a.pdf", b"%PDF-1.4".to_vec())])
            .await;
        assert_eq!(total, 1);

        let mut finished = None;
        for _ in 0..200 {
            {
                let jobs = state.jobs.read().await;
                let job = jobs.get(id).unwrap();
                if job.state != JobState::Running {
                    finished = Some((job.state, job.error.clone(), job.status_text.clone()));
                }
            }
            if finished.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let (job_state, error, status_text) = finished.expect("batch never left the running state");
        assert_eq!(job_state, JobState::Failed);
        assert!(error.unwrap().contains("panicked"));
        assert!(status_text.ends_with("No data extracted"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_evicts_oldest_finished_jobs() {
        let mut manager = JobManager::new();
        let running = manager.create(1);

        let mut finished = Vec::new();
        for _ in 0..MAX_FINISHED_JOBS {
            let id = manager.create(1);
            manager.finish(id, Err(ExportError::NothingExtracted));
            finished.push(id);
        }

        manager.create(1);

        assert!(manager.get(running).is_some());
        assert!(manager.get(finished[0]).is_none());
        assert!(manager.get(finished[1]).is_some());
        assert_eq!(manager.len(), MAX_FINISHED_JOBS + 1);
    }
}
