use actix_web::{web, HttpResponse};
use std::sync::Arc;
use tracing::{error, info};

use crate::AppState;
use dlogic::error::{validate_request, AppError};
use dlogic::models::{EngineRequestBody, RefreshResponse};

const ENGINE_FAILURE: &str = "Failed to execute boat engine";
const REFRESH_FAILURE: &str = "Failed to refresh knowledge";

/// Score and rank the participants of one race
pub async fn score_race(
    state: web::Data<Arc<AppState>>,
    body: web::Json<EngineRequestBody>,
) -> Result<HttpResponse, AppError> {
    let (context, participants) = validate_request(body.into_inner())?;

    let response = state
        .engine
        .run(&context, &participants)
        .await
        .map_err(|e| {
            error!("Engine failed for race {}: {}", context.race_id, e);
            AppError::from_engine(ENGINE_FAILURE, e)
        })?;

    Ok(HttpResponse::Ok().json(response))
}

/// Reload the knowledge index from its configured source
pub async fn refresh_knowledge(state: web::Data<Arc<AppState>>) -> Result<HttpResponse, AppError> {
    let index = state.engine.store().refresh().await.map_err(|e| {
        error!("Knowledge refresh failed: {}", e);
        AppError::EngineError {
            message: REFRESH_FAILURE.to_string(),
            details: e.to_string(),
        }
    })?;

    info!(
        "Knowledge refreshed: {} racers from {}",
        index.len(),
        index.metadata.source
    );

    Ok(HttpResponse::Ok().json(RefreshResponse {
        knowledge_source: index.metadata.source.clone(),
        knowledge_size: index.len(),
        generated_at: index.metadata.generated_at.clone(),
    }))
}
