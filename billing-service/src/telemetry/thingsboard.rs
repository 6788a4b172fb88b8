use std::collections::HashMap;

use crate::config::TelemetryConfig;

use super::{TelemetryClient, TelemetryError};

#[derive(Debug, serde::Deserialize)]
struct TelemetryPoint {
    #[allow(dead_code)]
    #[serde(default)]
    ts: Option<i64>,
    value: serde_json::Value,
}

/// Each timeseries key maps to a list of points, most recent first.
type TimeseriesBody = HashMap<String, Vec<TelemetryPoint>>;

pub struct ThingsBoardClient {
    http: reqwest::Client,
    cfg: TelemetryConfig,
}

impl ThingsBoardClient {
    pub fn new(cfg: TelemetryConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }

    fn timeseries_url(&self) -> String {
        format!(
            "{}/api/plugins/telemetry/DEVICE/{}/values/timeseries?keys={}",
            self.cfg.base_url, self.cfg.device_id, self.cfg.metric
        )
    }
}

#[async_trait::async_trait]
impl TelemetryClient for ThingsBoardClient {
    async fn latest_value(&self) -> Result<f64, TelemetryError> {
        let response = self
            .http
            .get(self.timeseries_url())
            .header("X-Authorization", format!("Bearer {}", self.cfg.token))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TelemetryError::Auth(status.as_u16()));
        }
        if !status.is_success() {
            return Err(TelemetryError::Http(status.as_u16()));
        }

        let body: TimeseriesBody = response.json().await?;
        latest_metric_value(&body, &self.cfg.metric)
    }
}

/// Extracts the first (most recent) point of `key`, accepting the value as a
/// JSON number or a numeric string.
fn latest_metric_value(body: &TimeseriesBody, key: &str) -> Result<f64, TelemetryError> {
    let point = body
        .get(key)
        .and_then(|series| series.first())
        .ok_or_else(|| TelemetryError::Malformed(format!("metric `{key}` missing or empty")))?;

    match &point.value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| TelemetryError::Malformed(format!("metric `{key}` is not an f64"))),
        serde_json::Value::String(s) => s.parse().map_err(|_| {
            TelemetryError::Malformed(format!("metric `{key}` is not numeric: {s:?}"))
        }),
        other => Err(TelemetryError::Malformed(format!(
            "metric `{key}` has unexpected type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> TimeseriesBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn reads_numeric_string_values() {
        let body = parse(r#"{"power":[{"ts":1,"value":"17.8"},{"ts":0,"value":"3"}]}"#);
        let v = latest_metric_value(&body, "power").unwrap();
        assert_eq!(v, 17.8);
    }

    #[test]
    fn reads_plain_number_values() {
        let body = parse(r#"{"power":[{"ts":1,"value":42.9}]}"#);
        let v = latest_metric_value(&body, "power").unwrap();
        assert_eq!(v, 42.9);
    }

    #[test]
    fn only_the_first_point_is_consulted() {
        let body = parse(r#"{"power":[{"ts":2,"value":"5"},{"ts":1,"value":"999"}]}"#);
        let v = latest_metric_value(&body, "power").unwrap();
        assert_eq!(v, 5.0);
    }

    #[test]
    fn missing_metric_key_is_malformed() {
        let body = parse(r#"{"voltage":[{"ts":1,"value":"230"}]}"#);
        let res = latest_metric_value(&body, "power");
        assert!(matches!(res, Err(TelemetryError::Malformed(_))));
    }

    #[test]
    fn empty_series_is_malformed() {
        let body = parse(r#"{"power":[]}"#);
        let res = latest_metric_value(&body, "power");
        assert!(matches!(res, Err(TelemetryError::Malformed(_))));
    }

    #[test]
    fn non_numeric_value_is_malformed() {
        let body = parse(r#"{"power":[{"ts":1,"value":"off"}]}"#);
        let res = latest_metric_value(&body, "power");
        assert!(matches!(res, Err(TelemetryError::Malformed(_))));
    }
}
