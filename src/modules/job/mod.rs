use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};

pub mod dto;
pub mod errors;
pub mod events;
pub mod handler;
pub mod model;
pub mod progress;
pub mod readiness;
pub mod service;
pub mod ui;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handler::health))
        .route("/readiness", get(handler::readiness))
        .route("/ui", get(handler::ui))
        .route("/ws", get(handler::ws))
        .route("/file", post(handler::select_file))
        .route("/compress", post(handler::compress))
        .route("/cancel", post(handler::cancel))
        .route("/performance-test", post(handler::performance_test))
        .route("/downloads/{id}", get(handler::download))
}
