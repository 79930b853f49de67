use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/start", post(handlers::start))
        .route("/back", post(handlers::back))
        .route("/sync", post(handlers::sync_form))
        .route("/api/session", get(handlers::get_session))
        .route("/api/navigate", post(handlers::navigate))
        .route("/api/inputs", post(handlers::update_inputs))
        .route("/api/predict", post(handlers::predict))
        .route("/api/sync", post(handlers::sync))
        .route("/api/history", get(handlers::get_history))
        .with_state(state)
}
