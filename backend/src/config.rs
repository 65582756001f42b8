// Environment-driven process configuration.

use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::warn;

use crate::constants::{
    DEFAULT_AGENT_DATA_PORT, DEFAULT_CHANNEL_SCHEME, DEFAULT_FEAGI_API_PORT, DEFAULT_HTTP_PORT,
};

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub http_addr: SocketAddr,
    pub feagi_host: String,
    pub api_url: String,
    pub agent_id: String,
    pub agent_type: String,
    pub agent_data_port: u16,
    pub channel_scheme: String,
    pub capabilities: Option<serde_json::Value>,
}

impl RelayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let bind = lookup("RELAY_HTTP_BIND")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let port = lookup("RELAY_HTTP_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_HTTP_PORT);

        let feagi_host = lookup("FEAGI_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let api_port = lookup("FEAGI_API_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_FEAGI_API_PORT);
        let api_url = lookup("FEAGI_API_URL")
            .map(|value| value.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("http://{}:{}", feagi_host, api_port));

        let capabilities = lookup("AGENT_CAPABILITIES").and_then(|raw| {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(?err, "ignoring malformed AGENT_CAPABILITIES");
                    None
                }
            }
        });

        Self {
            http_addr: SocketAddr::new(bind, port),
            feagi_host,
            api_url,
            agent_id: lookup("AGENT_ID").unwrap_or_else(|| "burst_relay".to_string()),
            agent_type: lookup("AGENT_TYPE").unwrap_or_else(|| "both".to_string()),
            agent_data_port: lookup("AGENT_DATA_PORT")
                .and_then(|value| value.parse::<u16>().ok())
                .unwrap_or(DEFAULT_AGENT_DATA_PORT),
            channel_scheme: lookup("CHANNEL_SCHEME")
                .unwrap_or_else(|| DEFAULT_CHANNEL_SCHEME.to_string()),
            capabilities,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> RelayConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]);
        assert_eq!(config.http_addr, "127.0.0.1:9050".parse().unwrap());
        assert_eq!(config.api_url, "http://127.0.0.1:8000");
        assert_eq!(config.channel_scheme, "udp");
        assert!(config.capabilities.is_none());
    }

    #[test]
    fn explicit_api_url_wins_over_host_and_port() {
        let config = config_from(&[
            ("FEAGI_HOST", "10.0.0.9"),
            ("FEAGI_API_PORT", "9000"),
            ("FEAGI_API_URL", "https://feagi.example/"),
        ]);
        assert_eq!(config.feagi_host, "10.0.0.9");
        assert_eq!(config.api_url, "https://feagi.example");
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let config = config_from(&[
            ("RELAY_HTTP_PORT", "not-a-port"),
            ("AGENT_DATA_PORT", "70000"),
            ("AGENT_CAPABILITIES", "{broken"),
        ]);
        assert_eq!(config.http_addr.port(), DEFAULT_HTTP_PORT);
        assert_eq!(config.agent_data_port, DEFAULT_AGENT_DATA_PORT);
        assert!(config.capabilities.is_none());
    }
}
