use actix_web::{middleware, web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

mod handlers;

use dlogic::config::{self, KnowledgeConfig};
use dlogic::error::json_error_handler;
use dlogic::{KnowledgeStore, ScoringEngine};
use handlers::{engine, health};

/// Application state shared across handlers
pub struct AppState {
    pub engine: ScoringEngine,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config::log_level())
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let addr = config::server_addr();
    let knowledge_config = KnowledgeConfig::from_env();

    let store = KnowledgeStore::new(knowledge_config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    let store = Arc::new(store);

    // Warm the knowledge cache; requests retry the load if this fails
    match store.index().await {
        Ok(index) => info!(
            "Knowledge loaded: {} racers from {}",
            index.len(),
            index.metadata.source
        ),
        Err(e) => warn!("Failed to load knowledge at startup: {}. Will retry on request.", e),
    }

    let app_state = Arc::new(AppState {
        engine: ScoringEngine::new(store),
    });

    info!("Starting D-Logic boat engine at http://{}", addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .wrap(middleware::Logger::default())
            .route("/health", web::get().to(health::health_check))
            .route("/engines/boat-dlogic", web::post().to(engine::score_race))
            .route("/knowledge/refresh", web::post().to(engine::refresh_knowledge))
    })
    .bind(&addr)?
    .run()
    .await
}
