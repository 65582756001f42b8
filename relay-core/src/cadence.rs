// Burst cadence tracking and resynchronization decisions.

use std::time::Duration;

use serde::Serialize;

pub const BASELINE_CHECKPOINT_INTERVAL: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CadenceState {
    Stable,
    Polling,
    Resyncing,
}

/// Values reported by the simulator's control endpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CadenceSample {
    pub burst_period: f64,
    pub burst_counter: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resync {
    pub local_counter: u64,
    pub remote_counter: u64,
    /// Set when the period changed as well; the relay jumps its counter here.
    pub fast_forward_to: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PollOutcome {
    pub previous_period: f64,
    pub period_changed: bool,
    pub resync: Option<Resync>,
}

/// Number of cycles between control polls for a given burst period. `None`
/// for periods that are not a usable non-zero sleep.
pub fn checkpoint_interval_for(burst_period: f64) -> Option<u32> {
    match Duration::try_from_secs_f64(burst_period) {
        Ok(sleep) if !sleep.is_zero() => {}
        _ => return None,
    }
    if burst_period >= 1.0 {
        return Some(BASELINE_CHECKPOINT_INTERVAL);
    }
    let scaled = (BASELINE_CHECKPOINT_INTERVAL as f64 / burst_period) as u32;
    Some(scaled.max(1))
}

#[derive(Clone, Debug)]
pub struct CadenceTracker {
    state: CadenceState,
    burst_period: f64,
    remote_burst_counter: u64,
    checkpoint_interval: u32,
    checkpoints_since_poll: u32,
}

impl CadenceTracker {
    pub fn new(burst_period: f64, remote_burst_counter: u64) -> Self {
        Self {
            state: CadenceState::Stable,
            burst_period,
            remote_burst_counter,
            checkpoint_interval: BASELINE_CHECKPOINT_INTERVAL,
            checkpoints_since_poll: 0,
        }
    }

    pub fn state(&self) -> CadenceState {
        self.state
    }

    pub fn burst_period(&self) -> f64 {
        self.burst_period
    }

    pub fn remote_burst_counter(&self) -> u64 {
        self.remote_burst_counter
    }

    pub fn checkpoint_interval(&self) -> u32 {
        self.checkpoint_interval
    }

    pub fn checkpoints_since_poll(&self) -> u32 {
        self.checkpoints_since_poll
    }

    pub fn sleep_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.burst_period).unwrap_or_default()
    }

    /// Records one relay cycle. Returns true when a control poll is due, in
    /// which case the tracker has moved to `Polling`.
    pub fn checkpoint(&mut self) -> bool {
        self.checkpoints_since_poll = self.checkpoints_since_poll.saturating_add(1);
        if self.checkpoints_since_poll < self.checkpoint_interval {
            return false;
        }
        self.checkpoints_since_poll = 0;
        self.state = CadenceState::Polling;
        true
    }

    pub fn poll_failed(&mut self) {
        self.state = CadenceState::Stable;
    }

    /// Applies a successful poll. `None` means the sample was rejected
    /// (non-positive or non-finite period) and nothing changed.
    pub fn apply_sample(&mut self, local_counter: u64, sample: CadenceSample) -> Option<PollOutcome> {
        let Some(interval) = checkpoint_interval_for(sample.burst_period) else {
            self.state = CadenceState::Stable;
            return None;
        };

        let previous_period = self.burst_period;
        let period_changed = sample.burst_period != previous_period;
        self.burst_period = sample.burst_period;
        self.checkpoint_interval = interval;
        self.remote_burst_counter = sample.burst_counter;

        let resync = if local_counter < sample.burst_counter {
            self.state = CadenceState::Resyncing;
            Some(Resync {
                local_counter,
                remote_counter: sample.burst_counter,
                fast_forward_to: period_changed.then_some(sample.burst_counter),
            })
        } else {
            self.state = CadenceState::Stable;
            None
        };

        Some(PollOutcome {
            previous_period,
            period_changed,
            resync,
        })
    }

    pub fn finish_resync(&mut self) {
        self.state = CadenceState::Stable;
    }
}
