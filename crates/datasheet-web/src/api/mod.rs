mod batches;
mod config;
mod schema;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/batches", batches::router())
        .nest("/config", config::router())
        .nest("/schema", schema::router())
}
