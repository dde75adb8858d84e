//! Entry point: load config, wire dependencies, and run the server.

use rolegate::config::Config;
use rolegate::db::{self, PgCredentialStore};
use rolegate::repositories::RedisRepository;
use rolegate::{create_app, AppState};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = db::create_pool(&config.database_url).await?;
    db::migrate(&db_pool).await?;
    let users = Arc::new(PgCredentialStore::new(db_pool));
    let redis = Arc::new(RedisRepository::new(&config.redis_url).await?);

    let state = AppState::build(&config, users, redis);
    let app = create_app(state).layer(CorsLayer::permissive());

    tracing::info!(
        addr = %config.server_addr,
        access_ttl_secs = config.access_token_ttl.as_secs(),
        refresh_ttl_secs = config.refresh_token_ttl.as_secs(),
        "listening"
    );
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
