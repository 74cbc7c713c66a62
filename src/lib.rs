use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod services;
pub mod storage;

use config::Config;
use database::Database;
use errors::Result;
use handlers::AppState;
use middleware::auth::TokenVerifier;
use providers::ProviderRegistry;
use services::redis::RedisService;
use storage::{KvCacheStorage, ObjectStorage, StorageRouter};

/// Connects the backing services described by `config` and assembles the
/// shared state. The verifier is injected so tests can use a static one.
pub async fn build_state(config: Config, verifier: Arc<dyn TokenVerifier>) -> Result<AppState> {
    let database = Database::new(&config.database_url).await?;
    database.migrate().await?;

    let redis = match &config.redis_url {
        Some(url) => Some(RedisService::new(url).await?),
        None => None,
    };

    let object = match &config.audio_storage_dir {
        Some(dir) => Some(ObjectStorage::new(dir, &config.audio_public_base_url)?),
        None => None,
    };
    let cache = redis
        .clone()
        .map(|r| KvCacheStorage::new(r, config.audio_cache_ttl_secs));
    let storage = Arc::new(StorageRouter::new(object, cache));

    let providers = ProviderRegistry::new(&config);

    Ok(AppState {
        database,
        redis,
        storage,
        providers,
        config: Arc::new(config),
        verifier,
    })
}

pub fn create_app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        .route("/api/tts/generate", post(handlers::tts::generate))
        .route("/api/tts/generate/sync", post(handlers::tts::generate_sync))
        .route("/api/tts/status/:job_id", get(handlers::tts::status))
        .route("/api/user/quota", get(handlers::user::get_quota))
        .route("/api/user/usage", get(handlers::user::get_usage))
        .route("/api/audios", get(handlers::audios::list))
        .route(
            "/api/audios/:id",
            get(handlers::audios::get).delete(handlers::audios::remove),
        )
        .route("/api/audios/stream/:id", get(handlers::audios::stream));

    // Durable artifacts are plain files under the storage dir; serve them
    // at the public base the object store bakes into URLs.
    if let Some(dir) = &state.config.audio_storage_dir {
        router = router.nest_service("/files", ServeDir::new(dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
