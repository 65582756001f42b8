// Shared constants for relay timing, protocol, and endpoints.

pub const DEFAULT_HTTP_PORT: u16 = 9050;
pub const DEFAULT_FEAGI_API_PORT: u16 = 8000;
pub const DEFAULT_AGENT_DATA_PORT: u16 = 10000;
pub const DEFAULT_CHANNEL_SCHEME: &str = "udp";

pub const CONTROL_TIMEOUT_SECS: u64 = 5;
pub const REGISTRATION_RETRY_SECS: u64 = 2;

pub const NETWORK_ENDPOINT: &str = "/v1/feagi/feagi/network";
pub const REGISTER_ENDPOINT: &str = "/v1/agent/register";
pub const CONTROL_BASE_PATH: &str = "/v1/feagi/feagi/burst_engine";
pub const BURST_PERIOD_PATH: &str = "/burst_period";
pub const BURST_COUNTER_PATH: &str = "/burst_counter";

pub const SUBSCRIBE_INTERVAL_SECS: u64 = 1;
pub const SUBSCRIBE_BYTE: u8 = 0x53;
pub const MAX_DATAGRAM_LEN: usize = 65_507;

pub const EMPTY_ACK: &str = "{}";
