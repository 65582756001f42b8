// Relay loop behavior over scripted simulator and control fakes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;

use burst_relay_server::app::{RelayShared, RelayStatus};
use burst_relay_server::control::ControlError;
use burst_relay_server::relay::{ControlPlane, CycleReport, RelayLoop, SimulatorLink};
use relay_core::burst::{CommandMap, InputBurst, OutputBurst, SensoryData};
use relay_core::cadence::{CadenceSample, CadenceState, CadenceTracker};

#[derive(Default)]
struct LinkLog {
    outputs: VecDeque<Option<OutputBurst>>,
    sent: Vec<InputBurst>,
    resubscribes: Vec<Option<u16>>,
}

#[derive(Clone, Default)]
struct FakeLink {
    log: Arc<Mutex<LinkLog>>,
}

impl FakeLink {
    fn queue(&self, output: Option<OutputBurst>) {
        self.log.lock().unwrap().outputs.push_back(output);
    }

    fn sent_counters(&self) -> Vec<u64> {
        self.log.lock().unwrap().sent.iter().map(|b| b.counter).collect()
    }
}

impl SimulatorLink for FakeLink {
    fn receive(&mut self) -> Option<OutputBurst> {
        self.log.lock().unwrap().outputs.pop_front().flatten()
    }

    fn send(&mut self, burst: &InputBurst) {
        self.log.lock().unwrap().sent.push(burst.clone());
    }

    async fn resubscribe(&mut self, port: Option<u16>) {
        self.log.lock().unwrap().resubscribes.push(port);
    }
}

#[derive(Clone, Default)]
struct FakeControl {
    samples: Arc<Mutex<VecDeque<Result<CadenceSample, ControlError>>>>,
    calls: Arc<AtomicU32>,
    output_port: Option<u16>,
}

impl FakeControl {
    fn script(samples: Vec<Result<CadenceSample, ControlError>>) -> Self {
        Self {
            samples: Arc::new(Mutex::new(samples.into())),
            ..Self::default()
        }
    }
}

impl ControlPlane for FakeControl {
    async fn fetch_cadence(&self) -> Result<CadenceSample, ControlError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.samples
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(ControlError::Timeout))
    }

    async fn fetch_output_port(&self) -> Option<u16> {
        self.output_port
    }
}

fn sample(burst_period: f64, burst_counter: u64) -> Result<CadenceSample, ControlError> {
    Ok(CadenceSample {
        burst_period,
        burst_counter,
    })
}

fn relay(
    link: FakeLink,
    control: FakeControl,
    burst_period: f64,
    counter: u64,
) -> (RelayLoop<FakeLink, FakeControl>, RelayShared) {
    let tracker = CadenceTracker::new(burst_period, counter);
    let shared = RelayShared::new(RelayStatus::new(&tracker, counter));
    let relay = RelayLoop::new(link, control, tracker, counter, shared.clone());
    (relay, shared)
}

async fn run_cycles(relay: &mut RelayLoop<FakeLink, FakeControl>, cycles: usize) -> Vec<CycleReport> {
    let mut reports = Vec::with_capacity(cycles);
    for _ in 0..cycles {
        reports.push(relay.run_cycle().await);
    }
    reports
}

fn motor(id: &str, value: f64) -> OutputBurst {
    let mut map = CommandMap::new();
    map.insert(id.to_string(), value);
    OutputBurst {
        motor: Some(map),
        misc: None,
    }
}

#[tokio::test(start_paused = true)]
async fn twelve_cycles_poll_twice_and_adopt_latest_period() {
    let link = FakeLink::default();
    let control = FakeControl::script(vec![sample(1.0, 0), sample(2.0, 0)]);
    let calls = control.calls.clone();
    let (mut relay, _) = relay(link.clone(), control, 1.0, 0);

    let reports = run_cycles(&mut relay, 12).await;

    let polled: Vec<usize> = reports
        .iter()
        .enumerate()
        .filter(|(_, r)| r.polled)
        .map(|(i, _)| i + 1)
        .collect();
    assert_eq!(polled, vec![5, 10]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(reports[8].slept, Duration::from_secs(1));
    assert_eq!(reports[10].slept, Duration::from_secs(2));
    assert_eq!(reports[11].slept, Duration::from_secs(2));
    assert_eq!(relay.tracker().burst_period(), 2.0);
    assert_eq!(link.sent_counters(), (0..12).collect::<Vec<u64>>());
}

#[tokio::test(start_paused = true)]
async fn slot_keeps_latest_transform_and_ignores_absent_bursts() {
    let link = FakeLink::default();
    let (mut relay, shared) = relay(link.clone(), FakeControl::default(), 0.1, 0);

    link.queue(Some(motor("m1", 7.0)));
    relay.run_cycle().await;
    let first = shared.front_end.lock().await.take().unwrap();
    assert_eq!(first.motor.unwrap().get("m1"), Some(&2.0));

    link.queue(Some(motor("m1", 9.0)));
    relay.run_cycle().await;
    link.queue(None);
    let report = relay.run_cycle().await;
    assert!(!report.received);
    let kept = shared.front_end.lock().await.take().unwrap();
    assert_eq!(kept.motor.unwrap().get("m1"), Some(&4.0));

    for value in [10.0, 11.0, 12.0] {
        link.queue(Some(motor("m1", value)));
        relay.run_cycle().await;
    }
    let latest = shared.front_end.lock().await.take().unwrap();
    assert_eq!(latest.motor.unwrap().get("m1"), Some(&7.0));

    let mut misc = CommandMap::new();
    misc.insert("0".to_string(), 4.0);
    link.queue(Some(OutputBurst {
        motor: None,
        misc: Some(misc),
    }));
    relay.run_cycle().await;
    let payload = shared.front_end.lock().await.take().unwrap();
    assert!(payload.motor.is_none());
    assert_eq!(payload.misc.unwrap().get("0"), Some(&3.0));
}

#[tokio::test(start_paused = true)]
async fn failed_poll_keeps_previous_cadence() {
    let link = FakeLink::default();
    let control = FakeControl::script(vec![sample(0.5, 0)]);
    let (mut relay, shared) = relay(link, control, 1.0, 0);

    let reports = run_cycles(&mut relay, 5).await;
    assert!(reports[4].polled && !reports[4].poll_failed);
    assert_eq!(relay.tracker().checkpoint_interval(), 10);

    let reports = run_cycles(&mut relay, 10).await;
    assert!(reports[9].polled);
    assert!(reports[9].poll_failed);
    assert_eq!(reports[9].slept, Duration::from_millis(500));
    assert_eq!(relay.tracker().burst_period(), 0.5);
    assert_eq!(relay.tracker().checkpoint_interval(), 10);
    assert_eq!(relay.tracker().state(), CadenceState::Stable);

    let status = shared.status.read().await.clone();
    assert_eq!(status.polls, 2);
    assert_eq!(status.failed_polls, 1);
    assert_eq!(status.cycles, 15);
}

#[tokio::test(start_paused = true)]
async fn resync_with_new_period_jumps_counter_forward() {
    let link = FakeLink::default();
    let mut control = FakeControl::script(vec![sample(0.5, 100)]);
    control.output_port = Some(31000);
    let (mut relay, shared) = relay(link.clone(), control, 1.0, 0);

    let reports = run_cycles(&mut relay, 7).await;

    let resync = reports[4].resync.expect("resync at the first poll");
    assert_eq!(resync.local_counter, 5);
    assert_eq!(resync.fast_forward_to, Some(100));
    assert_eq!(link.log.lock().unwrap().resubscribes, vec![Some(31000)]);
    assert_eq!(link.sent_counters(), vec![0, 1, 2, 3, 4, 100, 101]);
    assert_eq!(relay.tracker().state(), CadenceState::Stable);
    assert_eq!(shared.status.read().await.resyncs, 1);
}

#[tokio::test(start_paused = true)]
async fn resync_with_same_period_keeps_counting() {
    let link = FakeLink::default();
    let control = FakeControl::script(vec![sample(1.0, 100)]);
    let (mut relay, _) = relay(link.clone(), control, 1.0, 0);

    let reports = run_cycles(&mut relay, 7).await;

    assert!(reports[4].resync.is_some());
    assert_eq!(link.log.lock().unwrap().resubscribes, vec![None]);
    assert_eq!(link.sent_counters(), (0..7).collect::<Vec<u64>>());
}

#[tokio::test(start_paused = true)]
async fn counter_ahead_of_simulator_never_moves_back() {
    let link = FakeLink::default();
    let control = FakeControl::script(vec![sample(0.25, 3)]);
    let (mut relay, _) = relay(link.clone(), control, 1.0, 50);

    let reports = run_cycles(&mut relay, 6).await;

    assert!(reports.iter().all(|r| r.resync.is_none()));
    assert!(link.log.lock().unwrap().resubscribes.is_empty());
    assert_eq!(link.sent_counters(), (50..56).collect::<Vec<u64>>());
    assert_eq!(relay.tracker().checkpoint_interval(), 20);
}

#[tokio::test(start_paused = true)]
async fn front_end_data_feeds_exactly_one_input_burst() {
    let link = FakeLink::default();
    let (mut relay, shared) = relay(link.clone(), FakeControl::default(), 0.1, 0);

    let mut first = SensoryData::new();
    first.insert("camera".to_string(), serde_json::json!([0, 1]));
    let mut second = SensoryData::new();
    second.insert("camera".to_string(), serde_json::json!([1, 1]));
    shared.sensory.lock().await.push(first);
    shared.sensory.lock().await.push(second.clone());

    relay.run_cycle().await;
    relay.run_cycle().await;

    let log = link.log.lock().unwrap();
    assert_eq!(log.sent[0].sensory_data, second);
    assert!(log.sent[1].sensory_data.is_empty());
}

#[tokio::test(start_paused = true)]
async fn stop_signal_still_sends_the_current_burst() {
    let link = FakeLink::default();
    let (relay, shared) = relay(link.clone(), FakeControl::default(), 10.0, 7);
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    relay.run(rx).await;

    assert_eq!(link.sent_counters(), vec![7]);
    assert_eq!(shared.status.read().await.cycles, 1);
}
