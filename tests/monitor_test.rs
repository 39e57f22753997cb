//! End-to-end tests for the sample-to-lock control loop

use chrono::{DateTime, TimeZone, Utc};
use sleep_lock_agent::lock::StepFailure;
use sleep_lock_agent::{
    ActuatorError, Config, LockActuator, LockEvent, SensorSample, SleepMonitor, SleepState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

const DELAY: Duration = Duration::from_secs(2);

#[derive(Default)]
struct RecordingActuator {
    calls: AtomicUsize,
    fail: bool,
}

impl RecordingActuator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LockActuator for RecordingActuator {
    fn perform_lock(&self) -> Result<(), ActuatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(ActuatorError::StepsFailed(vec![StepFailure {
                step: "pause media".into(),
                reason: "no active player".into(),
            }]))
        } else {
            Ok(())
        }
    }
}

fn monitor_with(actuator: Arc<RecordingActuator>) -> SleepMonitor {
    let mut config = Config::default();
    config.lock_delay = DELAY;
    SleepMonitor::new(&config, actuator, Handle::current()).expect("valid config")
}

fn at(second: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(second, 0).unwrap()
}

fn resting(second: i64) -> SensorSample {
    SensorSample::at(at(second), 55, 0.0, 0.0, 0.0)
}

fn active(second: i64) -> SensorSample {
    SensorSample::at(at(second), 90, 0.4, 0.1, 0.2)
}

#[tokio::test(start_paused = true)]
async fn test_falls_asleep_and_locks_once() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());

    let transitions: Vec<(i64, SleepState)> = (1..=60)
        .filter_map(|s| monitor.ingest(resting(s)).map(|state| (s, state)))
        .collect();
    assert_eq!(transitions, vec![(60, SleepState::Asleep)]);
    assert!(monitor.is_lock_pending());

    tokio::time::sleep(DELAY + Duration::from_millis(500)).await;

    assert_eq!(actuator.calls(), 1);
    assert!(!monitor.is_lock_pending());
    assert!(monitor.last_lock_time().is_some());

    // Nothing more happens while the wearer stays asleep.
    tokio::time::sleep(DELAY * 5).await;
    assert_eq!(actuator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_waking_before_delay_cancels_lock() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());

    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    assert!(monitor.is_lock_pending());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(monitor.ingest(active(61)), Some(SleepState::Awake));
    assert!(!monitor.is_lock_pending());

    tokio::time::sleep(DELAY * 3).await;
    assert_eq!(actuator.calls(), 0);
    assert_eq!(monitor.last_lock_time(), None);
}

#[tokio::test(start_paused = true)]
async fn test_window_stays_bounded() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator);

    for s in 1..=400 {
        monitor.ingest(resting(s));
        assert!(monitor.window_len() <= 300);
    }
    assert_eq!(monitor.window_len(), 300);
    assert_eq!(monitor.stats().map(|s| s.sample_count), Some(60));
}

#[tokio::test(start_paused = true)]
async fn test_staying_asleep_arms_once() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());
    let events = monitor.lock_events();

    for s in 1..=250 {
        monitor.ingest(resting(s));
    }

    let armed = events
        .try_iter()
        .filter(|e| matches!(e, LockEvent::Armed { .. }))
        .count();
    assert_eq!(armed, 1);

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(actuator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_light_sleep_counts_as_leaving_asleep() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());

    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    assert!(monitor.is_lock_pending());

    // Restless but still low heart rate: light sleep.
    let mut last = None;
    for s in 61..=120 {
        let sample = SensorSample::at(at(s), 62, 0.07, 0.0, 0.0);
        last = monitor.ingest(sample).or(last);
    }
    assert_eq!(last, Some(SleepState::LightSleep));
    assert!(!monitor.is_lock_pending());

    tokio::time::sleep(DELAY * 2).await;
    assert_eq!(actuator.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reentering_asleep_rearms() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());

    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    monitor.ingest(active(61));
    assert!(!monitor.is_lock_pending());

    // A full quiet minute pushes the noisy sample out of the analysis slice.
    let mut transitions = Vec::new();
    for s in 62..=121 {
        if let Some(state) = monitor.ingest(resting(s)) {
            transitions.push(state);
        }
    }
    assert_eq!(transitions, vec![SleepState::Asleep]);
    assert!(monitor.is_lock_pending());

    tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
    assert_eq!(actuator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_actuator_failure_is_reported_and_loop_continues() {
    let actuator = Arc::new(RecordingActuator {
        calls: AtomicUsize::new(0),
        fail: true,
    });
    let mut monitor = monitor_with(actuator.clone());
    let events = monitor.lock_events();

    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    tokio::time::sleep(DELAY + Duration::from_secs(1)).await;

    assert_eq!(actuator.calls(), 1);
    assert!(!monitor.is_lock_pending());
    assert_eq!(monitor.last_lock_time(), None);
    assert!(events
        .try_iter()
        .any(|e| matches!(e, LockEvent::Failed(_))));

    // The monitor keeps classifying afterwards.
    assert_eq!(monitor.ingest(active(61)), Some(SleepState::Awake));
}

#[tokio::test(start_paused = true)]
async fn test_observers_see_changes_in_order() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator);
    let mut state = monitor.subscribe_state();
    let mut last_lock = monitor.subscribe_last_lock();

    assert_eq!(*state.borrow_and_update(), SleepState::Awake);
    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), SleepState::Asleep);

    last_lock.changed().await.unwrap();
    assert!(last_lock.borrow().is_some());
    assert_eq!(monitor.current_state(), SleepState::Asleep);
}

#[tokio::test(start_paused = true)]
async fn test_reset_requires_full_minimum_again() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());

    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    monitor.reset();
    monitor.reset();
    assert_eq!(monitor.current_state(), SleepState::Awake);

    for s in 61..=119 {
        assert_eq!(monitor.ingest(resting(s)), None);
    }
    assert_eq!(monitor.ingest(resting(120)), Some(SleepState::Asleep));

    tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
    assert_eq!(actuator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_prevents_pending_lock() {
    let actuator = Arc::new(RecordingActuator::default());
    let mut monitor = monitor_with(actuator.clone());

    for s in 1..=60 {
        monitor.ingest(resting(s));
    }
    monitor.shutdown();
    drop(monitor);

    tokio::time::sleep(DELAY * 3).await;
    assert_eq!(actuator.calls(), 0);
}
