// Simulator channel addresses in `scheme://host:port` form.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing scheme separator in {0:?}")]
    MissingScheme(String),
    #[error("missing port in {0:?}")]
    MissingPort(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
    #[error("empty host in {0:?}")]
    EmptyHost(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl ChannelAddress {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    /// Same scheme and host, different port. Used when the simulator moves
    /// its output channel.
    pub fn with_port(&self, port: u16) -> Self {
        Self {
            port,
            ..self.clone()
        }
    }

    /// `host:port`, with IPv6 hosts bracketed, suitable for socket resolution.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority())
    }
}

impl FromStr for ChannelAddress {
    type Err = AddressError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = value
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(value.to_string()))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| AddressError::MissingPort(value.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(AddressError::EmptyHost(value.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort(value.to_string()))?;
        Ok(Self::new(scheme, host, port))
    }
}
