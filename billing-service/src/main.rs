use std::sync::Arc;

use anyhow::Result;
use billing_service::{
    api, config::AppConfig, ledger::EthLedgerClient, observability, session::BillingSession,
    telemetry::ThingsBoardClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::from_env()?;

    if let Some(addr) = &cfg.metrics_bind_addr {
        observability::init_metrics(addr);
    }

    let telemetry = Arc::new(ThingsBoardClient::new(cfg.telemetry.clone()));
    let ledger = Arc::new(EthLedgerClient::connect(&cfg.ledger).await?);
    let session = Arc::new(BillingSession::new(telemetry, ledger));

    // One best-effort meter snapshot at startup; afterwards the user
    // re-triggers submission explicitly, so there is no polling loop.
    if let Err(e) = session.refresh_reading().await {
        tracing::warn!(error = %e, "initial meter reading unavailable");
    }

    let app = api::router(session);
    let listener = tokio::net::TcpListener::bind(&cfg.http_bind_addr).await?;
    tracing::info!(addr = %cfg.http_bind_addr, "billing service listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
