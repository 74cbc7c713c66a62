use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tts_api_server::{
    build_state, config::Config, create_app, middleware::auth::IdentityProviderVerifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tts_api_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env()?;
    let port = config.port;

    let verifier = Arc::new(IdentityProviderVerifier::new(
        config.identity_userinfo_url.clone(),
    ));
    let state = build_state(config, verifier).await?;
    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
