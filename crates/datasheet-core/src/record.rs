use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Provenance column added to every record.
pub const SOURCE_FILE_COLUMN: &str = "source_file";

/// One file handed in by the caller for a batch run.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    #[must_use]
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

impl FieldValue {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Null renders as an empty string so it lands as an empty CSV cell.
impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Null => Ok(()),
        }
    }
}

/// Field values parsed out of one service response, before provenance is attached.
pub type ExtractedFields = BTreeMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRecord {
    pub source_file: String,
    pub fields: ExtractedFields,
}

impl ExtractedRecord {
    #[must_use]
    pub fn new(source_file: impl Into<String>, fields: ExtractedFields) -> Self {
        Self {
            source_file: source_file.into(),
            fields,
        }
    }

    /// Value for a column; `source_file` resolves to the provenance field.
    #[must_use]
    pub fn value(&self, column: &str) -> FieldValue {
        if column == SOURCE_FILE_COLUMN {
            return FieldValue::Text(self.source_file.clone());
        }
        self.fields.get(column).cloned().unwrap_or(FieldValue::Null)
    }
}
