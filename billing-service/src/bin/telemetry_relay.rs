//! Development relay: forwards `/thingsboard/{path}` to the telemetry
//! platform with the prefix stripped and a clean origin, so a locally served
//! UI can reach the platform without CORS trouble. Deployment convenience
//! only; the billing service itself talks to the platform directly.

use anyhow::Result;
use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Router,
};
use billing_service::observability;

#[derive(Clone)]
struct Relay {
    http: reqwest::Client,
    upstream: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let upstream = std::env::var("BILLING_RELAY_UPSTREAM")
        .unwrap_or_else(|_| "https://eu.thingsboard.cloud".to_string());
    let bind_addr = std::env::var("BILLING_RELAY_BIND_ADDR")
        .unwrap_or_else(|_| "127.0.0.1:5173".to_string());

    let relay = Relay {
        http: reqwest::Client::new(),
        upstream: upstream.trim_end_matches('/').to_string(),
    };

    let app = Router::new()
        .route("/thingsboard/*path", get(forward))
        .with_state(relay);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, upstream = %upstream, "telemetry relay listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn forward(
    State(relay): State<Relay>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<(StatusCode, String), StatusCode> {
    let mut url = format!("{}/{}", relay.upstream, path);
    if let Some(q) = query {
        url.push('?');
        url.push_str(&q);
    }

    // Forward the credential; drop every other inbound header so the
    // upstream sees a clean origin.
    let mut request = relay.http.get(&url);
    if let Some(auth) = headers.get("x-authorization").and_then(|v| v.to_str().ok()) {
        request = request.header("X-Authorization", auth);
    }

    let response = request.send().await.map_err(|e| {
        tracing::error!(error = %e, url = %url, "relay upstream request failed");
        StatusCode::BAD_GATEWAY
    })?;

    let status =
        StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = response.text().await.map_err(|e| {
        tracing::error!(error = %e, "relay upstream body read failed");
        StatusCode::BAD_GATEWAY
    })?;

    Ok((status, body))
}
