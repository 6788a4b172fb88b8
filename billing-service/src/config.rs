use std::env;

use anyhow::Context;

/// Where and how to read the latest meter value.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Base URL of the telemetry platform, without a trailing slash.
    pub base_url: String,
    /// Bearer token passed via `X-Authorization`.
    pub token: String,
    pub device_id: String,
    /// Timeseries key to read; the platform publishes meter load as `power`.
    pub metric: String,
}

/// Ledger endpoint, contract and signer identity.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub rpc_url: String,
    pub contract_address: String,
    /// Hex-encoded signing key. Never leaves the process.
    pub private_key: String,
    /// Account the transactions are attributed to.
    pub account: String,
    pub receipt_poll_ms: u64,
    pub receipt_poll_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telemetry: TelemetryConfig,
    pub ledger: LedgerConfig,
    pub http_bind_addr: String,
    pub metrics_bind_addr: Option<String>,
}

impl AppConfig {
    /// Loads the whole configuration from the environment, once, at startup.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            telemetry: TelemetryConfig {
                base_url: required("BILLING_TELEMETRY_BASE_URL")?,
                token: required("BILLING_TELEMETRY_TOKEN")?,
                device_id: required("BILLING_DEVICE_ID")?,
                metric: optional("BILLING_TELEMETRY_METRIC").unwrap_or_else(|| "power".into()),
            },
            ledger: LedgerConfig {
                rpc_url: required("BILLING_RPC_URL")?,
                contract_address: required("BILLING_CONTRACT_ADDRESS")?,
                private_key: required("BILLING_PRIVATE_KEY")?,
                account: required("BILLING_ACCOUNT")?,
                receipt_poll_ms: parsed("BILLING_RECEIPT_POLL_MS", 1_000)?,
                receipt_poll_attempts: parsed("BILLING_RECEIPT_POLL_ATTEMPTS", 120)?,
            },
            http_bind_addr: optional("BILLING_HTTP_BIND_ADDR")
                .unwrap_or_else(|| "127.0.0.1:8080".into()),
            metrics_bind_addr: optional("BILLING_METRICS_BIND_ADDR"),
        })
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("missing required environment variable {name}"))
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(name) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        None => Ok(default),
    }
}
