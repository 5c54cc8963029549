//! OpenSASE Storefront - order and inventory service

use std::sync::Arc;

use anyhow::Result;
use opensase_storefront::{
    api::{self, AppState},
    publisher::EventPublisher,
    store::{MemoryStore, PgStore, Store},
    telemetry, Config, Storefront,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();
    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.db_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store, nothing will persist");
            Arc::new(MemoryStore::new())
        }
    };

    let events = match &config.nats_url {
        Some(url) => EventPublisher::connect(url).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "event bus unavailable; events will only be logged");
            EventPublisher::disabled()
        }),
        None => EventPublisher::disabled(),
    };

    tracing::info!(
        strict_transitions = config.policy.transitions.strict,
        restock_on_cancel = config.policy.transitions.restock_on_cancel,
        hide_foreign_orders = config.policy.hide_foreign_orders,
        events = events.is_enabled(),
        "order policy"
    );

    let state = AppState { shop: Storefront::new(store, events, config.policy) };
    let app = api::router(state);

    let addr = config.addr();
    tracing::info!("🚀 OpenSASE Storefront listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
