use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use datasheet_core::SchemaField;
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_schema))
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub name: String,
    pub primary: String,
    pub fields: Vec<SchemaField>,
}

async fn get_schema(State(state): State<AppState>) -> impl IntoResponse {
    Json(SchemaResponse {
        name: state.schema.name().to_string(),
        primary: state.schema.primary().name.clone(),
        fields: state.schema.fields().to_vec(),
    })
}
