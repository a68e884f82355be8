use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::record::SOURCE_FILE_COLUMN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema has no fields")]
    Empty,
    #[error("Duplicate field: {0}")]
    DuplicateField(String),
    #[error("Field name is reserved: {0}")]
    ReservedField(String),
    #[error("Primary field not found: {0}")]
    UnknownPrimary(String),
    #[error("Primary field must be required: {0}")]
    OptionalPrimary(String),
    #[error("Invalid field type: {0}")]
    InvalidFieldType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Float,
    Integer,
}

impl FieldType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Float => "float",
            Self::Integer => "integer",
        }
    }

    /// Type name in the service's OpenAPI-style response schema.
    #[must_use]
    pub const fn wire_type(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Float => "NUMBER",
            Self::Integer => "INTEGER",
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "float" => Ok(Self::Float),
            "integer" => Ok(Self::Integer),
            _ => Err(SchemaError::InvalidFieldType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: String,
}

impl SchemaField {
    #[must_use]
    pub fn required(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            required: true,
            description: description.to_string(),
        }
    }

    #[must_use]
    pub fn optional(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            required: false,
            ..Self::required(name, field_type, description)
        }
    }
}

/// Record shape requested from the extraction service.
///
/// Fields keep their declaration order, which is also the export column
/// order after `source_file` and the primary field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSchema {
    name: String,
    fields: Vec<SchemaField>,
    primary: usize,
}

impl ExtractionSchema {
    pub fn new(
        name: impl Into<String>,
        fields: Vec<SchemaField>,
        primary: &str,
    ) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name == SOURCE_FILE_COLUMN {
                return Err(SchemaError::ReservedField(field.name.clone()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }

        let primary_index = fields
            .iter()
            .position(|f| f.name == primary)
            .ok_or_else(|| SchemaError::UnknownPrimary(primary.to_string()))?;

        if !fields[primary_index].required {
            return Err(SchemaError::OptionalPrimary(primary.to_string()));
        }

        Ok(Self {
            name: name.into(),
            fields,
            primary: primary_index,
        })
    }

    /// Compressor datasheet schema used by the web front end.
    #[must_use]
    pub fn compressor_specs() -> Self {
        let fields = vec![
            SchemaField::required(
                "model_name",
                FieldType::String,
                "The general model name of the compressor",
            ),
            SchemaField::optional("max_supported_power_kw", FieldType::Float, "Motor power in kW"),
            SchemaField::optional(
                "aerodynamic_efficiency_percent",
                FieldType::Float,
                "Max aerodynamic efficiency",
            ),
            SchemaField::optional(
                "max_motor_shaft_speed_rpm",
                FieldType::Integer,
                "Motor shaft speed in RPM",
            ),
            SchemaField::optional(
                "rated_motor_current_amps",
                FieldType::Float,
                "Rated motor current in Amps",
            ),
            SchemaField::optional("weight_kg", FieldType::Float, "Weight in kg"),
            SchemaField::optional("cooling_medium", FieldType::String, "Type of cooling medium"),
            SchemaField::required(
                "pros_and_cons_summary",
                FieldType::String,
                "Write a 1-sentence summary of the main pros and cons.",
            ),
        ];

        Self {
            name: "CompressorSpecs".to_string(),
            fields,
            primary: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    #[must_use]
    pub fn primary(&self) -> &SchemaField {
        &self.fields[self.primary]
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Non-primary fields in declaration order.
    pub fn secondary_fields(&self) -> impl Iterator<Item = &SchemaField> {
        let primary = self.primary;
        self.fields
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != primary)
            .map(|(_, f)| f)
    }

    /// Renders the schema as the service's `responseSchema` object.
    #[must_use]
    pub fn response_schema(&self) -> Value {
        let mut properties = Map::new();
        for field in &self.fields {
            let mut prop = json!({
                "type": field.field_type.wire_type(),
                "description": field.description,
            });
            if !field.required {
                prop["nullable"] = Value::Bool(true);
            }
            properties.insert(field.name.clone(), prop);
        }

        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();

        let ordering: Vec<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();

        json!({
            "type": "OBJECT",
            "properties": properties,
            "required": required,
            "propertyOrdering": ordering,
        })
    }
}
