use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use datasheet_core::{CSV_FILE_NAME, CSV_MIME, UploadedFile};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::state::{AppState, Job, JobId, JobState};

/// Multipart part name carrying the datasheets
const FILES_FIELD: &str = "files";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_batch))
        .route("/{id}", get(get_batch))
        .route("/{id}/csv", get(download_csv))
}

#[derive(Debug, Serialize)]
pub struct CreateBatchResponse {
    pub id: JobId,
    pub total: usize,
}

async fn create_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid upload: {e}")))?
    {
        if field.name() != Some(FILES_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        if !is_pdf(&name) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Only PDF files are accepted: {name}"),
            ));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read {name}: {e}")))?;
        files.push(UploadedFile::new(name, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No PDF files uploaded".to_string()));
    }

    let (id, total) = state.submit(files).await;
    tracing::info!(job = %id, total, "Accepted batch");

    Ok((StatusCode::ACCEPTED, Json(CreateBatchResponse { id, total })))
}

fn is_pdf(name: &str) -> bool {
    std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub id: JobId,
    pub state: JobState,
    pub completed: usize,
    pub total: usize,
    pub status_text: String,
    pub summary: String,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Job> for BatchStatusResponse {
    fn from(job: &Job) -> Self {
        let (columns, rows) = job
            .table
            .as_ref()
            .map(|t| (t.columns().to_vec(), t.json_rows()))
            .unwrap_or_default();

        Self {
            id: job.id,
            state: job.state,
            completed: job.completed,
            total: job.total,
            status_text: job.status_text.clone(),
            summary: job.summary(),
            warnings: job.warnings.iter().map(ToString::to_string).collect(),
            error: job.error.clone(),
            columns,
            rows,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let jobs = state.jobs.read().await;
    let job = jobs.get(id).ok_or_else(|| not_found(id))?;

    Ok(Json(BatchStatusResponse::from(job)))
}

async fn download_csv(
    State(state): State<AppState>,
    Path(id): Path<JobId>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let jobs = state.jobs.read().await;
    let job = jobs.get(id).ok_or_else(|| not_found(id))?;

    let table = match (job.state, &job.table) {
        (JobState::Running, _) => {
            return Err((StatusCode::CONFLICT, "Batch is still running".to_string()));
        }
        (_, Some(table)) => table,
        (_, None) => return Err((StatusCode::CONFLICT, "No data extracted".to_string())),
    };

    let csv = table
        .to_csv()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok((
        [
            (header::CONTENT_TYPE, format!("{CSV_MIME}; charset=utf-8")),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{CSV_FILE_NAME}\""),
            ),
        ],
        csv,
    ))
}

fn not_found(id: JobId) -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, format!("Batch not found: {id}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::response::Response;
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::api::testing;

    const BOUNDARY: &str = "datasheet-test-boundary";

    fn multipart_body(parts: &[(&str, &str)]) -> Body {
        let mut body = String::new();
        for (field, file) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file}\"\r\nContent-Type: application/pdf\r\n\r\n%PDF-1.4 {file}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));
        Body::from(body)
    }

    async fn send(app: &Router, request: Request<Body>) -> Response {
        app.clone().oneshot(request).await.unwrap()
    }

    async fn upload(app: &Router, parts: &[(&str, &str)]) -> Response {
        let request = Request::post("/batches")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(multipart_body(parts))
            .unwrap();
        send(app, request).await
    }

    async fn json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn wait_until_done(app: &Router, id: &str) -> Value {
        for _ in 0..200 {
            let response = send(app, Request::get(format!("/batches/{id}")).body(Body::empty()).unwrap()).await;
            let status = json(response).await;
            if status["state"] != "running" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("batch {id} never finished");
    }

    fn app(dir: &std::path::Path) -> Router {
        crate::api::router().with_state(testing::state(dir))
    }

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf("pump.pdf"));
        assert!(is_pdf("PUMP.PDF"));
        assert!(!is_pdf("pump.docx"));
        assert!(!is_pdf("pdf"));
        assert!(!is_pdf(""));
    }

    #[tokio::test]
    async fn test_batch_completes_with_rows_and_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = upload(
            &app,
            &[("files", "ga-11.pdf"), ("files", "broken.pdf"), ("files", "zr-90.pdf")],
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let created = json(response).await;
        assert_eq!(created["total"], 3);

        let id = created["id"].as_str().unwrap().to_string();
        let status = wait_until_done(&app, &id).await;

        assert_eq!(status["state"], "complete");
        assert_eq!(status["completed"], 3);
        assert_eq!(status["summary"], "Batch extraction complete with 2 records");
        assert_eq!(status["columns"][0], "source_file");
        assert_eq!(status["columns"][1], "model_name");
        assert_eq!(status["rows"][0]["source_file"], "ga-11.pdf");
        assert_eq!(status["rows"][1]["model_name"], "ZR-90");

        let warnings = status["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().starts_with("Failed to process broken.pdf"));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_csv_download() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let created = json(upload(&app, &[("files", "ga-11.pdf")]).await).await;
        let id = created["id"].as_str().unwrap().to_string();
        wait_until_done(&app, &id).await;

        let response = send(&app, Request::get(format!("/batches/{id}/csv")).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"industrial_specs.csv\""
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.starts_with(&[0xEF, 0xBB, 0xBF]));
        let text = String::from_utf8(body[3..].to_vec()).unwrap();
        assert!(text.starts_with("source_file,model_name,"));
        assert!(text.contains("ga-11.pdf,GA-11,"));
    }

    #[tokio::test]
    async fn test_csv_conflict_when_nothing_extracted() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let created = json(upload(&app, &[("files", "broken.pdf")]).await).await;
        let id = created["id"].as_str().unwrap().to_string();
        let status = wait_until_done(&app, &id).await;
        assert_eq!(status["state"], "empty");
        assert_eq!(status["summary"], "No data extracted");

        let response = send(&app, Request::get(format!("/batches/{id}/csv")).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());

        let response = upload(&app, &[("files", "notes.txt")]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = upload(&app, &[]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = upload(&app, &[("other", "ga-11.pdf")]).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_batch() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let id = Uuid::new_v4();

        let response = send(&app, Request::get(format!("/batches/{id}")).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, Request::get(format!("/batches/{id}/csv")).body(Body::empty()).unwrap()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
