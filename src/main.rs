use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use phishwatch::config::Config;
use phishwatch::routes;
use phishwatch::services::campaign_service::CampaignManager;
use phishwatch::services::event_stream::MailEvents;
use phishwatch::services::{poller_service, retention_service};
use phishwatch::state::AppState;
use phishwatch::store::MailStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,phishwatch=debug")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    std::fs::create_dir_all(&config.tmp_dir).ok();
    if let Some(parent) = config.inbox_cache.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let store = Arc::new(MailStore::new(
        config.inbox_cache.clone(),
        config.inbox_capacity,
    ));
    let events = Arc::new(MailEvents::new());
    let campaigns = Arc::new(CampaignManager::new());

    poller_service::start(config.clone(), store.clone(), events.clone());
    retention_service::start(config.clone(), store.clone());

    let state = AppState {
        config: config.clone(),
        store,
        events,
        campaigns,
    };
    let app = routes::router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}
