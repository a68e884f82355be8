use std::path::Path;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::config::Config;
use crate::schema::ExtractionSchema;
use crate::service::{ExtractionService, RemoteArtifactHandle, ServiceError, ServiceResult};

const PDF_MIME: &str = "application/pdf";
const API_KEY_HEADER: &str = "x-goog-api-key";
const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";

/// Gemini API client covering the Files API and `generateContent`.
///
/// Built once at startup and shared by every batch.
pub struct GeminiClient {
    inner: Client,
    api_key: String,
    model: String,
    base: Url,
}

impl GeminiClient {
    pub fn new(config: &Config) -> ServiceResult<Self> {
        let inner = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(concat!("datasheet-core/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            inner,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base: with_trailing_slash(config.api_base.clone()),
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self, path: &str) -> ServiceResult<Url> {
        Ok(self.base.join(path)?)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

async fn ensure_success(response: Response) -> ServiceResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFileInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFileInfo {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<FileData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    mime_type: &'a str,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

fn build_generate_request<'a>(
    handle: &'a RemoteArtifactHandle,
    prompt: &'a str,
    schema: &ExtractionSchema,
) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![
                Part {
                    file_data: Some(FileData {
                        mime_type: &handle.mime_type,
                        file_uri: &handle.uri,
                    }),
                    text: None,
                },
                Part {
                    file_data: None,
                    text: Some(prompt),
                },
            ],
        }],
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: schema.response_schema(),
        },
    }
}

/// Concatenates the text parts of the first candidate.
fn response_text(response: GenerateResponse) -> ServiceResult<String> {
    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.get("blockReason"))
            .and_then(Value::as_str)
            .unwrap_or("no candidates returned")
            .to_string();
        return Err(ServiceError::Protocol(reason));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "empty".to_string());
        return Err(ServiceError::Protocol(format!("candidate has no text ({reason})")));
    }

    Ok(text)
}

#[async_trait::async_trait]
impl ExtractionService for GeminiClient {
    async fn upload(&self, path: &Path, display_name: &str) -> ServiceResult<RemoteArtifactHandle> {
        let bytes = tokio::fs::read(path).await?;

        let start = self
            .inner
            .post(self.endpoint("upload/v1beta/files")?)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len())
            .header("X-Goog-Upload-Header-Content-Type", PDF_MIME)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Protocol("missing upload URL header".to_string()))?
            .to_string();

        let finished = self
            .inner
            .post(&upload_url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await?;
        let finished = ensure_success(finished).await?;

        let info: UploadResponse = finished.json().await?;
        tracing::debug!(name = %info.file.name, "uploaded {}", display_name);

        Ok(RemoteArtifactHandle::new(
            info.file.name,
            info.file.uri,
            info.file.mime_type.unwrap_or_else(|| PDF_MIME.to_string()),
        ))
    }

    async fn generate(
        &self,
        handle: &RemoteArtifactHandle,
        prompt: &str,
        schema: &ExtractionSchema,
    ) -> ServiceResult<String> {
        let url = self.endpoint(&format!("v1beta/models/{}:generateContent", self.model))?;
        let body = build_generate_request(handle, prompt, schema);

        let response = self
            .inner
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let parsed: GenerateResponse = response.json().await?;
        response_text(parsed)
    }

    async fn delete(&self, handle: &RemoteArtifactHandle) -> ServiceResult<()> {
        let url = self.endpoint(&format!("v1beta/{}", handle.name))?;

        let response = self
            .inner
            .delete(url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        ensure_success(response).await?;

        Ok(())
    }
}
