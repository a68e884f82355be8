use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use datasheet_core::CSV_FILE_NAME;
use serde::Serialize;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_config))
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub model: String,
    pub cooldown_seconds: u64,
    pub output_file: &'static str,
    pub max_upload_bytes: usize,
}

async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(ConfigResponse {
        model: state.model.clone(),
        cooldown_seconds: state.cooldown_seconds,
        output_file: CSV_FILE_NAME,
        max_upload_bytes: state.config.max_upload_bytes,
    })
}
