mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use messup_api::{AppStateInner, JwtAuthenticator, LocalMediaStore, routes};
use messup_gateway::Dispatcher;

use config::{Config, DEFAULT_JWT_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "messup=debug,tower_http=debug".into()),
        )
        .init();

    if config.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("MESSUP_JWT_SECRET is not set, using the development secret");
    }

    let db = messup_db::Database::open(&config.db_path)?;

    let state = AppStateInner::new(
        db,
        Dispatcher::new(),
        Arc::new(JwtAuthenticator::new(
            config.jwt_secret.clone(),
            chrono::Duration::days(config.token_ttl_days),
        )),
        Arc::new(LocalMediaStore::new(
            config.media_dir.clone(),
            config.public_url.clone(),
        )),
    );

    let app = routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address().parse()?;
    info!("Messup server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
