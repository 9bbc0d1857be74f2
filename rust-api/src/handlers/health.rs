use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::AppState;
use dlogic::models::HealthResponse;

/// Health check endpoint
///
/// Reports the cached index only; never triggers a load.
pub async fn health_check(state: web::Data<Arc<AppState>>) -> impl Responder {
    let cached = state.engine.store().cached().await;

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        knowledge_loaded: cached.is_some(),
        knowledge_size: cached.map(|index| index.len()).unwrap_or(0),
    };

    HttpResponse::Ok().json(response)
}
