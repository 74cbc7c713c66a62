use std::sync::Arc;

use crate::{
    config::Config, database::Database, middleware::auth::TokenVerifier,
    providers::ProviderRegistry, services::redis::RedisService, services::tts::TtsService,
    storage::StorageRouter,
};

pub mod audios;
pub mod health;
pub mod tts;
pub mod user;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub redis: Option<RedisService>,
    pub storage: Arc<StorageRouter>,
    pub providers: ProviderRegistry,
    pub config: Arc<Config>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppState {
    pub fn tts_service(&self) -> TtsService {
        TtsService::new(
            self.database.clone(),
            self.storage.clone(),
            self.providers.clone(),
        )
    }
}
