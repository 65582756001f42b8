// Burst-synchronized relay loop.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use relay_core::burst::{InputBurst, OutputBurst};
use relay_core::cadence::{CadenceSample, CadenceTracker, Resync};
use relay_core::transform::to_front_end;

use crate::app::RelayShared;
use crate::control::ControlError;
use crate::utils::{monotonic_ms, now_epoch_ms, wait_for_shutdown};

/// Transport toward the simulator as seen by the relay loop. Implementations
/// log their own failures; the loop never sees an error from them.
pub trait SimulatorLink {
    fn receive(&mut self) -> Option<OutputBurst>;
    fn send(&mut self, burst: &InputBurst);
    fn resubscribe(&mut self, port: Option<u16>) -> impl Future<Output = ()> + Send;
}

/// Read-only view of the simulator's burst engine.
pub trait ControlPlane {
    fn fetch_cadence(&self) -> impl Future<Output = Result<CadenceSample, ControlError>> + Send;
    fn fetch_output_port(&self) -> impl Future<Output = Option<u16>> + Send;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleReport {
    pub received: bool,
    pub polled: bool,
    pub poll_failed: bool,
    pub resync: Option<Resync>,
    pub sent_counter: u64,
    pub slept: Duration,
}

/// Drives one burst cycle after another, always in the same step order.
pub struct RelayLoop<L, C> {
    link: L,
    control: C,
    tracker: CadenceTracker,
    burst_counter: u64,
    shared: RelayShared,
    start: Instant,
    cycles: u64,
    polls: u64,
    failed_polls: u64,
    resyncs: u64,
}

impl<L, C> RelayLoop<L, C>
where
    L: SimulatorLink + Send,
    C: ControlPlane + Send + Sync,
{
    pub fn new(
        link: L,
        control: C,
        tracker: CadenceTracker,
        burst_counter: u64,
        shared: RelayShared,
    ) -> Self {
        Self {
            link,
            control,
            tracker,
            burst_counter,
            shared,
            start: Instant::now(),
            cycles: 0,
            polls: 0,
            failed_polls: 0,
            resyncs: 0,
        }
    }

    pub fn burst_counter(&self) -> u64 {
        self.burst_counter
    }

    pub fn tracker(&self) -> &CadenceTracker {
        &self.tracker
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Runs cycles until the stop flag is raised. The cycle in flight when the
    /// flag goes up cuts its sleep short but still transmits its input burst.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            burst_period = self.tracker.burst_period(),
            burst_counter = self.burst_counter,
            "relay loop started"
        );
        loop {
            let (burst, mut report) = self.prepare().await;
            let period = self.tracker.sleep_duration();
            let slept_at = Instant::now();
            let stopping = tokio::select! {
                _ = time::sleep(period) => false,
                _ = wait_for_shutdown(&mut shutdown) => true,
            };
            report.slept = slept_at.elapsed();
            self.transmit(burst, &mut report);
            self.publish_status().await;
            debug!(?report, "relay cycle complete");
            if stopping {
                break;
            }
        }
        info!(burst_counter = self.burst_counter, cycles = self.cycles, "relay loop stopped");
    }

    /// One full cycle without a stop signal.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let (burst, mut report) = self.prepare().await;
        let period = self.tracker.sleep_duration();
        time::sleep(period).await;
        report.slept = period;
        self.transmit(burst, &mut report);
        self.publish_status().await;
        report
    }

    async fn prepare(&mut self) -> (InputBurst, CycleReport) {
        let mut report = CycleReport::default();

        if let Some(output) = self.link.receive() {
            if let Some(payload) = to_front_end(&output) {
                let superseded = self.shared.front_end.lock().await.push(payload);
                if superseded {
                    debug!("front-end payload superseded before it was requested");
                }
                report.received = true;
            }
        }

        let sensory_data = self.shared.sensory.lock().await.take().unwrap_or_default();
        let burst = InputBurst {
            timestamp: now_epoch_ms(),
            counter: self.burst_counter,
            sensory_data,
        };
        self.burst_counter = self.burst_counter.saturating_add(1);

        if self.tracker.checkpoint() {
            report.polled = true;
            self.poll_cadence(&mut report).await;
        }

        (burst, report)
    }

    async fn poll_cadence(&mut self, report: &mut CycleReport) {
        self.polls += 1;
        let sample = match self.control.fetch_cadence().await {
            Ok(sample) => sample,
            Err(err) => {
                warn!(%err, "cadence poll failed; keeping previous cadence");
                self.tracker.poll_failed();
                self.failed_polls += 1;
                report.poll_failed = true;
                return;
            }
        };

        let Some(outcome) = self.tracker.apply_sample(self.burst_counter, sample) else {
            warn!(burst_period = sample.burst_period, "rejected cadence sample");
            self.failed_polls += 1;
            report.poll_failed = true;
            return;
        };

        if outcome.period_changed {
            info!(
                from = outcome.previous_period,
                to = sample.burst_period,
                checkpoint_interval = self.tracker.checkpoint_interval(),
                "burst period changed"
            );
        }

        if let Some(resync) = outcome.resync {
            self.resync(resync).await;
            report.resync = Some(resync);
        }
    }

    async fn resync(&mut self, resync: Resync) {
        info!(
            local = resync.local_counter,
            remote = resync.remote_counter,
            "burst counter behind simulator; resubscribing"
        );
        let port = self.control.fetch_output_port().await;
        self.link.resubscribe(port).await;
        if let Some(target) = resync.fast_forward_to {
            if target > self.burst_counter {
                info!(from = self.burst_counter, to = target, "fast-forwarding burst counter");
                self.burst_counter = target;
            }
        }
        self.tracker.finish_resync();
        self.resyncs += 1;
    }

    fn transmit(&mut self, burst: InputBurst, report: &mut CycleReport) {
        self.link.send(&burst);
        report.sent_counter = burst.counter;
        self.cycles += 1;
    }

    async fn publish_status(&self) {
        let mut status = self.shared.status.write().await;
        status.cadence_state = self.tracker.state();
        status.burst_period = self.tracker.burst_period();
        status.checkpoint_interval = self.tracker.checkpoint_interval();
        status.checkpoints_since_poll = self.tracker.checkpoints_since_poll();
        status.remote_burst_counter = self.tracker.remote_burst_counter();
        status.burst_counter = self.burst_counter;
        status.cycles = self.cycles;
        status.polls = self.polls;
        status.failed_polls = self.failed_polls;
        status.resyncs = self.resyncs;
        status.last_cycle_ms = Some(monotonic_ms(self.start));
    }
}
