//! Data-bundle storefront server

use anyhow::{Context, Result};
use databundle_store::api::{router, AppState};
use databundle_store::application::{CheckoutService, ReconciliationEngine, StatusService, VerificationClient};
use databundle_store::config::AppConfig;
use databundle_store::domain::ports::{CatalogStoreRef, EventPublisherRef, OrderStoreRef, PaymentGatewayRef};
use databundle_store::infrastructure::events::{LogEventPublisher, NatsEventPublisher};
use databundle_store::infrastructure::gateway::HttpPaymentGateway;
use databundle_store::infrastructure::in_memory::{InMemoryCatalogStore, InMemoryOrderStore};
use databundle_store::infrastructure::postgres::{PgCatalogStore, PgOrderStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SESSION_SWEEP_EVERY: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env().context("loading configuration")?;

    let (orders, catalog): (OrderStoreRef, CatalogStoreRef) = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await.context("connecting to postgres")?;
            sqlx::migrate!("./migrations").run(&db).await?;
            (Arc::new(PgOrderStore::new(db.clone())), Arc::new(PgCatalogStore::new(db)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; orders are kept in memory and lost on restart");
            (Arc::new(InMemoryOrderStore::new()), Arc::new(InMemoryCatalogStore::with_default_packages(&config.currency)))
        }
    };

    let events: EventPublisherRef = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsEventPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable; order events go to the log only");
                Arc::new(LogEventPublisher)
            }
        },
        None => Arc::new(LogEventPublisher),
    };

    let gateway: PaymentGatewayRef = Arc::new(HttpPaymentGateway::new(&config.gateway).context("building gateway client")?);
    let engine = ReconciliationEngine::new(orders.clone(), VerificationClient::new(gateway.clone()), events.clone(), config.reconcile.clone());
    let _sweeper = engine.spawn_session_sweeper(SESSION_SWEEP_EVERY);

    let state = AppState {
        checkout: Arc::new(CheckoutService::new(catalog.clone(), orders.clone(), gateway, engine.clone(), events, config.currency.as_str())),
        engine,
        status: StatusService::new(orders.clone()),
        catalog,
        orders,
        admin_token: config.admin_token.as_str().into(),
        support_link: config.support_link.as_str().into(),
    };

    let app = router(state);
    tracing::info!("databundle-store listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
