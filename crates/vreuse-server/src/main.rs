use std::sync::Arc;

use tracing::info;

use vreuse_db::Database;
use vreuse_server::build_app;
use vreuse_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vreuse=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Presence starts empty on every boot; clients re-identify.
    let db = Arc::new(Database::open(&config.db_path)?);
    let app = build_app(db, &config.jwt_secret, config.cors_origin.as_deref())?;

    let addr = config.addr()?;
    info!("Vreuse chat server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
