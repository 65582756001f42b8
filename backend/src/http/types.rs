// HTTP response payload types.

use serde::Serialize;

use crate::app::RelayStatus;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub relay: RelayStatus,
    pub client_connected: bool,
    pub payload_pending: bool,
    pub sensory_pending: bool,
    pub uptime_ms: u64,
}
