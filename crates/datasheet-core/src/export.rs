use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::record::{ExtractedRecord, FieldValue, SOURCE_FILE_COLUMN};
use crate::schema::ExtractionSchema;

pub const CSV_FILE_NAME: &str = "industrial_specs.csv";
pub const CSV_MIME: &str = "text/csv";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No data extracted")]
    NothingExtracted,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Aggregated batch output with normalized column order:
/// `source_file`, the primary field, then the rest in declaration order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl ResultTable {
    pub fn build(records: &[ExtractedRecord], schema: &ExtractionSchema) -> Result<Self, ExportError> {
        if records.is_empty() {
            return Err(ExportError::NothingExtracted);
        }

        let columns: Vec<String> = std::iter::once(SOURCE_FILE_COLUMN)
            .chain(std::iter::once(schema.primary().name.as_str()))
            .chain(schema.secondary_fields().map(|f| f.name.as_str()))
            .map(String::from)
            .collect();

        let rows = records
            .iter()
            .map(|record| columns.iter().map(|c| record.value(c)).collect())
            .collect();

        Ok(Self { columns, rows })
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows as JSON objects keyed by column, for on-page display.
    #[must_use]
    pub fn json_rows(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), serde_json::to_value(v).unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }

    /// Comma-separated text with a header row, UTF-8 with a byte-order mark
    /// so spreadsheet tools detect the encoding.
    pub fn to_csv(&self) -> Result<Vec<u8>, ExportError> {
        let mut writer = csv::Writer::from_writer(UTF8_BOM.to_vec());

        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(ToString::to_string))?;
        }

        writer
            .into_inner()
            .map_err(|e| ExportError::Io(e.into_error()))
    }
}
