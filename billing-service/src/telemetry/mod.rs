mod thingsboard;

pub use thingsboard::ThingsBoardClient;

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("credential rejected (HTTP {0})")]
    Auth(u16),
    #[error("unexpected HTTP status {0}")]
    Http(u16),
    #[error("malformed telemetry response: {0}")]
    Malformed(String),
}

/// Read-only view of the telemetry platform.
///
/// One best-effort snapshot per call; retrying and staleness masking are the
/// caller's concern.
#[async_trait::async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Latest raw value of the configured metric for the configured device.
    async fn latest_value(&self) -> Result<f64, TelemetryError>;
}
