//! Storefront Settlement - checkout, orders and Mercado Pago settlement

use std::sync::Arc;
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use storefront_settlement::api::{self, AppState, Settings};
use storefront_settlement::config::Config;
use storefront_settlement::messaging::EventBus;
use storefront_settlement::payments::MercadoPago;
use storefront_settlement::persistence::PgStore;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    tracing::debug!(?config, "configuration loaded");

    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await.context("connecting to database")?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, domain events will not be published"); None }
        },
        None => None,
    };
    if config.webhook_secret.is_none() { tracing::warn!("MP_WEBHOOK_SECRET is not set; every webhook will be ignored"); }

    let gateway = Arc::new(MercadoPago::new(&config.mercadopago)?);
    let state = AppState::new(Arc::new(PgStore::new(db)), gateway, EventBus::new(nats), Settings::from(&config));
    let app = api::router(state);

    tracing::info!("🚀 Storefront Settlement listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
