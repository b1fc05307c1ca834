use todos_api::{
    application::todo_store::TodoStore,
    config::Config,
    http::routing::{self, todos},
    infrastructure::registry::ClientRegistry,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let registry = ClientRegistry::new(config.redis.clone());
    let client = registry.client(&config.redis_url).await?;

    let store = TodoStore::new(client).with_search_limit(config.search_limit);
    store.initialize().await?;

    let router = routing::app(todos::router(todos::AppState { service: store }));

    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}
