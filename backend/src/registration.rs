// Startup registration handshake with the simulator.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};

use relay_core::address::ChannelAddress;

use crate::config::RelayConfig;
use crate::constants::{
    BURST_COUNTER_PATH, BURST_PERIOD_PATH, CONTROL_BASE_PATH, NETWORK_ENDPOINT, REGISTER_ENDPOINT,
    REGISTRATION_RETRY_SECS,
};
use crate::control::{control_http_client, get_body, parse_counter, parse_period, parse_port, ControlError};
use crate::net::agent_ip_for;
use crate::utils::wait_for_shutdown;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error("registration request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registration rejected with status {0}")]
    Rejected(u16),
    #[error("response is missing {0}")]
    MissingField(&'static str),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Everything the relay needs from the simulator to start.
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub host: String,
    pub control_base: String,
    pub network_url: String,
    pub outbound: ChannelAddress,
    pub inbound: ChannelAddress,
    pub burst_period: f64,
    pub burst_counter: u64,
}

/// Retries every `REGISTRATION_RETRY_SECS` until registration succeeds.
/// Returns `None` only when a stop is requested first.
pub async fn register_until_ready(
    config: &RelayConfig,
    mut shutdown: watch::Receiver<bool>,
) -> Option<Registration> {
    let http = control_http_client();
    let mut attempt: u64 = 0;
    loop {
        attempt += 1;
        match try_register(&http, config).await {
            Ok(registration) => {
                info!(
                    attempt,
                    host = %registration.host,
                    outbound = %registration.outbound,
                    inbound = %registration.inbound,
                    burst_period = registration.burst_period,
                    burst_counter = registration.burst_counter,
                    "registered with simulator"
                );
                return Some(registration);
            }
            Err(err) => {
                warn!(attempt, %err, "registration failed; retrying");
            }
        }

        tokio::select! {
            _ = time::sleep(Duration::from_secs(REGISTRATION_RETRY_SECS)) => {}
            _ = wait_for_shutdown(&mut shutdown) => return None,
        }
    }
}

pub async fn try_register(
    http: &Client,
    config: &RelayConfig,
) -> Result<Registration, RegistrationError> {
    let network_url = format!("{}{}", config.api_url, NETWORK_ENDPOINT);
    let network = get_json(http, &network_url).await?;
    let output_port = network
        .get("feagi_opu_port")
        .and_then(parse_port)
        .ok_or(RegistrationError::MissingField("feagi_opu_port"))?;

    let api_port = reqwest::Url::parse(&config.api_url)
        .ok()
        .and_then(|url| url.port_or_known_default())
        .unwrap_or(80);
    let agent_ip = agent_ip_for(&config.feagi_host, api_port).await;

    let params = [
        ("agent_type", config.agent_type.clone()),
        ("agent_id", config.agent_id.clone()),
        ("agent_ip", agent_ip.to_string()),
        ("agent_data_port", config.agent_data_port.to_string()),
        ("agent_version", env!("CARGO_PKG_VERSION").to_string()),
        ("controller_version", env!("CARGO_PKG_VERSION").to_string()),
    ];
    let response = http
        .post(format!("{}{}", config.api_url, REGISTER_ENDPOINT))
        .query(&params)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(RegistrationError::Rejected(response.status().as_u16()));
    }
    let body = response.text().await?;
    let agent_state: Value =
        serde_json::from_str(&body).map_err(|_| RegistrationError::Malformed(body.clone()))?;
    let data_port = agent_state
        .get("agent_data_port")
        .and_then(parse_port)
        .unwrap_or(config.agent_data_port);

    let control_base = format!("{}{}", config.api_url, CONTROL_BASE_PATH);
    let burst_period = parse_period(
        &get_body(http, &format!("{}{}", control_base, BURST_PERIOD_PATH)).await?,
    )?;
    let burst_counter = parse_counter(
        &get_body(http, &format!("{}{}", control_base, BURST_COUNTER_PATH)).await?,
    )?;

    Ok(Registration {
        host: config.feagi_host.clone(),
        control_base,
        network_url,
        outbound: ChannelAddress::new(&config.channel_scheme, &config.feagi_host, data_port),
        inbound: ChannelAddress::new(&config.channel_scheme, &config.feagi_host, output_port),
        burst_period,
        burst_counter,
    })
}

async fn get_json(http: &Client, url: &str) -> Result<Value, RegistrationError> {
    let body = get_body(http, url).await?;
    serde_json::from_str(&body).map_err(|_| RegistrationError::Malformed(body))
}
