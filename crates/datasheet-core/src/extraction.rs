use std::path::Path;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{ExtractedFields, FieldValue};
use crate::schema::{ExtractionSchema, FieldType};
use crate::service::{ExtractionService, RemoteArtifactHandle, ServiceError};

pub const DEFAULT_PROMPT: &str = "Extract the technical specifications. Leave missing specs as null.";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Upload failed: {0}")]
    Upload(#[source] ServiceError),
    #[error("Generation failed: {0}")]
    Generate(#[source] ServiceError),
    #[error("Service returned an empty response")]
    Empty,
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("Required field missing: {0}")]
    MissingField(String),
    #[error("Field {field} is not a valid {expected}")]
    TypeMismatch { field: String, expected: FieldType },
}

pub type ExtractionResult<T> = Result<T, ExtractionError>;

/// Outcome of one extraction, with the remote handle kept for cleanup
/// even when a later step failed.
#[derive(Debug)]
pub struct ExtractionAttempt {
    pub remote: Option<RemoteArtifactHandle>,
    pub result: ExtractionResult<ExtractedFields>,
}

/// Extraction client: one upload and one schema-constrained request per file.
pub struct Extractor<'a> {
    service: &'a dyn ExtractionService,
    prompt: &'a str,
}

impl<'a> Extractor<'a> {
    #[must_use]
    pub fn new(service: &'a dyn ExtractionService, prompt: &'a str) -> Self {
        Self { service, prompt }
    }

    pub async fn extract(
        &self,
        path: &Path,
        display_name: &str,
        schema: &ExtractionSchema,
    ) -> ExtractionAttempt {
        let handle = match self.service.upload(path, display_name).await {
            Ok(handle) => handle,
            Err(e) => {
                return ExtractionAttempt {
                    remote: None,
                    result: Err(ExtractionError::Upload(e)),
                }
            }
        };

        tracing::debug!(handle = %handle, "{} uploaded", display_name);

        let result = match self.service.generate(&handle, self.prompt, schema).await {
            Ok(payload) => parse_payload(&payload, schema),
            Err(e) => Err(ExtractionError::Generate(e)),
        };

        ExtractionAttempt {
            remote: Some(handle),
            result,
        }
    }
}

/// Parses a service payload into values typed per the schema.
pub fn parse_payload(payload: &str, schema: &ExtractionSchema) -> ExtractionResult<ExtractedFields> {
    let body = strip_code_fence(payload.trim());
    if body.is_empty() {
        return Err(ExtractionError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| ExtractionError::Malformed(e.to_string()))?;

    let Value::Object(object) = value else {
        return Err(ExtractionError::Malformed("expected a JSON object".to_string()));
    };

    to_fields(&object, schema)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Info string (language tag) runs to the end of the opening line
    let rest = match rest.split_once('\n') {
        Some((info, body)) if !info.contains('{') => body,
        _ => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn to_fields(object: &Map<String, Value>, schema: &ExtractionSchema) -> ExtractionResult<ExtractedFields> {
    let mut fields = ExtractedFields::new();

    for field in schema.fields() {
        let raw = object.get(&field.name).unwrap_or(&Value::Null);

        let value = if raw.is_null() {
            FieldValue::Null
        } else {
            coerce(raw, field.field_type).ok_or_else(|| ExtractionError::TypeMismatch {
                field: field.name.clone(),
                expected: field.field_type,
            })?
        };

        if field.required && is_blank(&value) {
            return Err(ExtractionError::MissingField(field.name.clone()));
        }

        fields.insert(field.name.clone(), value);
    }

    Ok(fields)
}

fn is_blank(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn coerce(raw: &Value, field_type: FieldType) -> Option<FieldValue> {
    match field_type {
        FieldType::String => match raw {
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Number(n) => Some(FieldValue::Text(n.to_string())),
            Value::Bool(b) => Some(FieldValue::Text(b.to_string())),
            _ => None,
        },
        FieldType::Float => match raw {
            Value::Number(n) => n.as_f64().map(FieldValue::Float),
            Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(FieldValue::Float),
            _ => None,
        },
        FieldType::Integer => {
            let parsed = match raw {
                Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
                Value::String(s) => {
                    let s = s.trim();
                    s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().and_then(integral))
                }
                _ => None,
            };
            parsed.map(FieldValue::Integer)
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
        Some(f as i64)
    } else {
        None
    }
}
