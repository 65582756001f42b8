// Application state and shared data structures for the relay.

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::Instant;

use relay_core::burst::{FrontEndPayload, SensoryData};
use relay_core::cadence::{CadenceState, CadenceTracker};

use crate::buffers::LatestSlot;

/// State the relay loop and the front-end bridge both touch. Nothing else is
/// shared between the two.
#[derive(Clone)]
pub struct RelayShared {
    pub front_end: Arc<Mutex<LatestSlot<FrontEndPayload>>>,
    pub sensory: Arc<Mutex<LatestSlot<SensoryData>>>,
    pub status: Arc<RwLock<RelayStatus>>,
}

impl RelayShared {
    pub fn new(status: RelayStatus) -> Self {
        Self {
            front_end: Arc::new(Mutex::new(LatestSlot::new())),
            sensory: Arc::new(Mutex::new(LatestSlot::new())),
            status: Arc::new(RwLock::new(status)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub shared: RelayShared,
    pub active_client: watch::Sender<u64>,
    pub client_sequence: Arc<AtomicU64>,
    pub client_connected: Arc<AtomicBool>,
    pub shutdown: watch::Receiver<bool>,
    pub start_instant: Instant,
}

impl AppState {
    pub fn new(shared: RelayShared, shutdown: watch::Receiver<bool>) -> Self {
        let (active_client, _) = watch::channel(0);
        Self {
            shared,
            active_client,
            client_sequence: Arc::new(AtomicU64::new(0)),
            client_connected: Arc::new(AtomicBool::new(false)),
            shutdown,
            start_instant: Instant::now(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RelayStatus {
    pub cadence_state: CadenceState,
    pub burst_period: f64,
    pub checkpoint_interval: u32,
    pub checkpoints_since_poll: u32,
    pub remote_burst_counter: u64,
    pub burst_counter: u64,
    pub cycles: u64,
    pub polls: u64,
    pub failed_polls: u64,
    pub resyncs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_ms: Option<u64>,
}

impl RelayStatus {
    pub fn new(tracker: &CadenceTracker, burst_counter: u64) -> Self {
        Self {
            cadence_state: tracker.state(),
            burst_period: tracker.burst_period(),
            checkpoint_interval: tracker.checkpoint_interval(),
            checkpoints_since_poll: tracker.checkpoints_since_poll(),
            remote_burst_counter: tracker.remote_burst_counter(),
            burst_counter,
            cycles: 0,
            polls: 0,
            failed_polls: 0,
            resyncs: 0,
            last_cycle_ms: None,
        }
    }
}
