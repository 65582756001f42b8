// Simulator control endpoint client.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use relay_core::cadence::{checkpoint_interval_for, CadenceSample};

use crate::constants::{BURST_COUNTER_PATH, BURST_PERIOD_PATH, CONTROL_TIMEOUT_SECS};
use crate::relay::ControlPlane;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("control request timed out")]
    Timeout,
    #[error("control request failed: {0}")]
    Http(reqwest::Error),
    #[error("control endpoint answered {0}")]
    Status(u16),
    #[error("malformed control response: {0:?}")]
    Malformed(String),
}

impl From<reqwest::Error> for ControlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

pub fn control_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(CONTROL_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Every request is bounded by the control timeout. Failures are reported to
/// the caller and never retried here.
#[derive(Clone)]
pub struct ControlClient {
    http: Client,
    base_url: String,
    network_url: Option<String>,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>, network_url: Option<String>) -> Self {
        Self {
            http: control_http_client(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            network_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn burst_period(&self) -> Result<f64, ControlError> {
        let body = get_body(&self.http, &format!("{}{}", self.base_url, BURST_PERIOD_PATH)).await?;
        parse_period(&body)
    }

    pub async fn burst_counter(&self) -> Result<u64, ControlError> {
        let body = get_body(&self.http, &format!("{}{}", self.base_url, BURST_COUNTER_PATH)).await?;
        parse_counter(&body)
    }

    /// Current simulator output port as advertised by the network endpoint.
    pub async fn output_port(&self) -> Result<Option<u16>, ControlError> {
        let Some(url) = self.network_url.as_ref() else {
            return Ok(None);
        };
        let body = get_body(&self.http, url).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|_| ControlError::Malformed(body.clone()))?;
        Ok(value.get("feagi_opu_port").and_then(parse_port))
    }
}

impl ControlPlane for ControlClient {
    async fn fetch_cadence(&self) -> Result<CadenceSample, ControlError> {
        let burst_period = self.burst_period().await?;
        let burst_counter = self.burst_counter().await?;
        Ok(CadenceSample {
            burst_period,
            burst_counter,
        })
    }

    async fn fetch_output_port(&self) -> Option<u16> {
        match self.output_port().await {
            Ok(port) => port,
            Err(err) => {
                tracing::warn!(%err, "network endpoint unavailable; keeping output port");
                None
            }
        }
    }
}

pub async fn get_body(http: &Client, url: &str) -> Result<String, ControlError> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(ControlError::Status(response.status().as_u16()));
    }
    Ok(response.text().await?)
}

pub fn parse_period(body: &str) -> Result<f64, ControlError> {
    let value: Value =
        serde_json::from_str(body.trim()).map_err(|_| ControlError::Malformed(body.to_string()))?;
    let period = match &value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    match period {
        Some(period) if checkpoint_interval_for(period).is_some() => Ok(period),
        _ => Err(ControlError::Malformed(body.to_string())),
    }
}

pub fn parse_counter(body: &str) -> Result<u64, ControlError> {
    let value: Value =
        serde_json::from_str(body.trim()).map_err(|_| ControlError::Malformed(body.to_string()))?;
    let counter = match &value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|value| *value >= 0.0 && value.fract() == 0.0)
                .map(|value| value as u64)
        }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    counter.ok_or_else(|| ControlError::Malformed(body.to_string()))
}

pub fn parse_port(value: &Value) -> Option<u16> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|port| u16::try_from(port).ok()),
        Value::String(text) => text.trim().parse::<u16>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    use super::*;

    async fn serve(app: Router) -> SocketAddr {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service());
        tokio::spawn(server);
        addr
    }

    #[test]
    fn parses_numeric_and_string_bodies() {
        assert_eq!(parse_period("0.5").unwrap(), 0.5);
        assert_eq!(parse_period("\"2\"").unwrap(), 2.0);
        assert_eq!(parse_counter("1200").unwrap(), 1200);
        assert_eq!(parse_counter("12.0").unwrap(), 12);
        assert_eq!(parse_counter("\"7\"").unwrap(), 7);
        assert_eq!(parse_port(&serde_json::json!("30000")), Some(30000));
        assert_eq!(parse_port(&serde_json::json!(70000)), None);
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(parse_period("0"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse_period("-1.5"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse_period("null"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse_period("1e20"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse_counter("-3"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse_counter("1.5"), Err(ControlError::Malformed(_))));
        assert!(matches!(parse_counter("<html>"), Err(ControlError::Malformed(_))));
    }

    #[tokio::test]
    async fn fetches_cadence_from_control_endpoint() {
        let app = Router::new()
            .route("/burst_period", get(|| async { "0.25" }))
            .route("/burst_counter", get(|| async { "4096" }));
        let addr = serve(app).await;

        let client = ControlClient::new(format!("http://{addr}/"), None);
        let sample = client.fetch_cadence().await.unwrap();
        assert_eq!(sample.burst_period, 0.25);
        assert_eq!(sample.burst_counter, 4096);
        assert_eq!(client.fetch_output_port().await, None);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let app = Router::new()
            .route(
                "/burst_period",
                get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
            )
            .route("/burst_counter", get(|| async { "1" }));
        let addr = serve(app).await;

        let client = ControlClient::new(format!("http://{addr}"), None);
        let result = client.fetch_cadence().await;
        assert!(matches!(result, Err(ControlError::Status(503))));
    }

    #[tokio::test]
    async fn reads_output_port_from_network_endpoint() {
        let app = Router::new().route(
            "/network",
            get(|| async { axum::Json(serde_json::json!({ "feagi_opu_port": "30001" })) }),
        );
        let addr = serve(app).await;

        let client = ControlClient::new(
            format!("http://{addr}"),
            Some(format!("http://{addr}/network")),
        );
        assert_eq!(client.fetch_output_port().await, Some(30001));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = ControlClient::new(format!("http://{addr}"), None);
        assert!(client.fetch_cadence().await.is_err());
    }
}
