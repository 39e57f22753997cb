//! Debounced, cancellable lock scheduling.
//!
//! Entering `Asleep` arms a single delayed lock. Any transition away from
//! `Asleep` cancels it. The timer runs as a tokio task; arming, cancelling
//! and firing all go through one mutex so a cancel that wins the lock before
//! the timer does always prevents the lock.

use crate::config::ConfigError;
use crate::core::SleepState;
use crate::lock::actuator::{ActuatorError, LockActuator};
use chrono::{DateTime, Utc};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Notifications emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockEvent {
    /// A lock was scheduled
    Armed { at: DateTime<Utc> },
    /// A scheduled lock was called off
    Cancelled,
    /// The actuator completed without errors
    Performed { at: DateTime<Utc> },
    /// The actuator reported failures
    Failed(ActuatorError),
}

enum Slot {
    Idle,
    Armed {
        generation: u64,
        armed_at: Instant,
        timer: JoinHandle<()>,
    },
}

struct SlotState {
    slot: Slot,
    next_generation: u64,
    closed: bool,
}

struct Shared {
    state: Mutex<SlotState>,
    actuator: Arc<dyn LockActuator>,
    last_lock: watch::Sender<Option<DateTime<Utc>>>,
    subscribers: Mutex<Vec<Sender<LockEvent>>>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver to current subscribers, dropping those whose receiver is gone.
    /// With no subscribers the event is discarded.
    fn emit(&self, event: LockEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Timer expiry. Only the arming that is still current may fire.
    fn fire(&self, generation: u64) {
        {
            let mut state = self.lock_state();
            match state.slot {
                Slot::Armed { generation: g, .. } if g == generation => {}
                _ => return,
            }
            state.slot = Slot::Idle;
        }
        tracing::info!("Lock delay elapsed, locking device");
        self.perform();
    }

    fn perform(&self) {
        match self.actuator.perform_lock() {
            Ok(()) => {
                let at = Utc::now();
                self.last_lock.send_replace(Some(at));
                tracing::info!(%at, "Device locked");
                self.emit(LockEvent::Performed { at });
            }
            Err(e) => {
                tracing::warn!("Lock attempt incomplete: {e}");
                self.emit(LockEvent::Failed(e));
            }
        }
    }
}

/// Two-state machine (idle or armed) driving the lock actuator.
pub struct LockScheduler {
    shared: Arc<Shared>,
    delay: Duration,
    runtime: Handle,
}

impl LockScheduler {
    /// Create an idle scheduler whose timers run on `runtime`.
    pub fn new(
        delay: Duration,
        actuator: Arc<dyn LockActuator>,
        runtime: Handle,
    ) -> Result<Self, ConfigError> {
        if delay.is_zero() {
            return Err(ConfigError::Invalid("lock delay must be positive".into()));
        }
        let (last_lock, _) = watch::channel(None);
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SlotState {
                    slot: Slot::Idle,
                    next_generation: 0,
                    closed: false,
                }),
                actuator,
                last_lock,
                subscribers: Mutex::new(Vec::new()),
            }),
            delay,
            runtime,
        })
    }

    /// React to a classifier transition.
    pub fn on_state_change(&self, state: SleepState) {
        if state == SleepState::Asleep {
            self.arm();
        } else {
            self.cancel();
        }
    }

    /// Schedule a lock unless one is already pending or the scheduler is shut down.
    fn arm(&self) {
        let mut state = self.shared.lock_state();
        if state.closed || matches!(state.slot, Slot::Armed { .. }) {
            return;
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let shared = Arc::clone(&self.shared);
        let delay = self.delay;
        let timer = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            shared.fire(generation);
        });

        state.slot = Slot::Armed {
            generation,
            armed_at: Instant::now(),
            timer,
        };
        tracing::info!(delay_secs = delay.as_secs_f64(), "Lock armed");
        self.shared.emit(LockEvent::Armed { at: Utc::now() });
    }

    /// Call off a pending lock. No-op when idle.
    pub fn cancel(&self) {
        let mut state = self.shared.lock_state();
        self.cancel_locked(&mut state);
    }

    fn cancel_locked(&self, state: &mut SlotState) {
        if let Slot::Armed { timer, .. } = std::mem::replace(&mut state.slot, Slot::Idle) {
            timer.abort();
            tracing::info!("Pending lock cancelled");
            self.shared.emit(LockEvent::Cancelled);
        }
    }

    /// Cancel anything pending and refuse to arm again.
    pub fn shutdown(&self) {
        let mut state = self.shared.lock_state();
        state.closed = true;
        self.cancel_locked(&mut state);
    }

    /// Run the actuator right away, bypassing the state machine.
    pub fn lock_now(&self) {
        self.shared.perform();
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.shared.lock_state().slot, Slot::Armed { .. })
    }

    /// When the pending lock was armed.
    pub fn armed_at(&self) -> Option<Instant> {
        match self.shared.lock_state().slot {
            Slot::Armed { armed_at, .. } => Some(armed_at),
            Slot::Idle => None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Time of the last successful lock.
    pub fn last_lock_time(&self) -> Option<DateTime<Utc>> {
        *self.shared.last_lock.borrow()
    }

    pub fn subscribe_last_lock(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.shared.last_lock.subscribe()
    }

    /// Subscribe to scheduler notifications from now on, in the order they
    /// happen. Dropping the receiver unsubscribes.
    pub fn events(&self) -> Receiver<LockEvent> {
        let (sender, receiver) = unbounded();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

}

impl Drop for LockScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::actuator::StepFailure;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_secs(120);

    #[derive(Default)]
    struct CountingActuator {
        calls: AtomicUsize,
        fail: bool,
    }

    impl LockActuator for CountingActuator {
        fn perform_lock(&self) -> Result<(), ActuatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ActuatorError::StepsFailed(vec![StepFailure {
                    step: "lock device".into(),
                    reason: "not permitted".into(),
                }]))
            } else {
                Ok(())
            }
        }
    }

    fn scheduler(actuator: Arc<CountingActuator>) -> LockScheduler {
        LockScheduler::new(DELAY, actuator, Handle::current()).unwrap()
    }

    fn subscriber_count(scheduler: &LockScheduler) -> usize {
        scheduler.shared.subscribers.lock().unwrap().len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());

        scheduler.on_state_change(SleepState::Asleep);
        assert!(scheduler.is_armed());

        tokio::time::sleep(DELAY - Duration::from_secs(1)).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
        assert!(scheduler.last_lock_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_while_armed_keeps_timer() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());

        scheduler.on_state_change(SleepState::Asleep);
        let first = scheduler.armed_at();
        tokio::time::sleep(Duration::from_secs(60)).await;
        scheduler.on_state_change(SleepState::Asleep);
        assert_eq!(scheduler.armed_at(), first);

        // Still fires at the original deadline.
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_lock() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());

        scheduler.on_state_change(SleepState::Asleep);
        tokio::time::sleep(DELAY - Duration::from_millis(1)).await;
        scheduler.on_state_change(SleepState::LightSleep);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.last_lock_time(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_cannot_fire_new_arming() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());

        scheduler.on_state_change(SleepState::Asleep);
        tokio::time::sleep(Duration::from_secs(100)).await;
        scheduler.on_state_change(SleepState::Awake);
        scheduler.on_state_change(SleepState::Asleep);

        // The first deadline passes without a lock.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 0);
        assert!(scheduler.is_armed());

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());
        let events = scheduler.events();

        scheduler.cancel();
        scheduler.on_state_change(SleepState::Asleep);
        scheduler.cancel();
        scheduler.cancel();

        let received: Vec<LockEvent> = events.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert!(matches!(received[0], LockEvent::Armed { .. }));
        assert_eq!(received[1], LockEvent::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_blocks_pending_and_future_locks() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());

        scheduler.on_state_change(SleepState::Asleep);
        scheduler.shutdown();
        scheduler.on_state_change(SleepState::Asleep);
        assert!(!scheduler.is_armed());

        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timer() {
        let actuator = Arc::new(CountingActuator::default());
        {
            let scheduler = scheduler(actuator.clone());
            scheduler.on_state_change(SleepState::Asleep);
        }
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(actuator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_still_returns_to_idle() {
        let actuator = Arc::new(CountingActuator {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let scheduler = scheduler(actuator.clone());
        let events = scheduler.events();

        scheduler.on_state_change(SleepState::Asleep);
        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;

        assert_eq!(actuator.calls.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_armed());
        assert_eq!(scheduler.last_lock_time(), None);

        let last = events.try_iter().last().unwrap();
        assert!(matches!(last, LockEvent::Failed(ref e) if e.failures().len() == 1));

        // A fresh asleep edge arms again.
        scheduler.on_state_change(SleepState::Asleep);
        assert!(scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_now_updates_observers() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());
        let mut last_lock = scheduler.subscribe_last_lock();

        scheduler.lock_now();

        assert_eq!(actuator.calls.load(Ordering::SeqCst), 1);
        assert!(last_lock.has_changed().unwrap());
        assert!(last_lock.borrow_and_update().is_some());
        assert!(!scheduler.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_not_retained_without_subscribers() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());

        for _ in 0..10_000 {
            scheduler.on_state_change(SleepState::Asleep);
            scheduler.on_state_change(SleepState::LightSleep);
        }
        assert_eq!(subscriber_count(&scheduler), 0);

        // A late subscriber only sees what happens after it subscribed.
        let events = scheduler.events();
        assert!(events.is_empty());
        scheduler.on_state_change(SleepState::Asleep);
        assert_eq!(events.len(), 1);

        // Dropping the receiver unsubscribes on the next event.
        drop(events);
        scheduler.on_state_change(SleepState::Awake);
        assert_eq!(subscriber_count(&scheduler), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_subscriber_sees_events_in_order() {
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = scheduler(actuator.clone());
        let first = scheduler.events();
        let second = scheduler.events();

        scheduler.on_state_change(SleepState::Asleep);
        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;

        for events in [first, second] {
            let received: Vec<LockEvent> = events.try_iter().collect();
            assert_eq!(received.len(), 2);
            assert!(matches!(received[0], LockEvent::Armed { .. }));
            assert!(matches!(received[1], LockEvent::Performed { .. }));
        }
    }

    #[tokio::test]
    async fn test_zero_delay_rejected() {
        let actuator = Arc::new(CountingActuator::default());
        assert!(LockScheduler::new(Duration::ZERO, actuator, Handle::current()).is_err());
    }

    #[test]
    fn test_concurrent_cancel_never_double_fires() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_time()
            .build()
            .unwrap();
        let actuator = Arc::new(CountingActuator::default());
        let scheduler = Arc::new(
            LockScheduler::new(Duration::from_millis(1), actuator.clone(), runtime.handle().clone())
                .unwrap(),
        );
        let events = scheduler.events();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let scheduler = Arc::clone(&scheduler);
                std::thread::spawn(move || {
                    for n in 0..200 {
                        if (n + i) % 2 == 0 {
                            scheduler.on_state_change(SleepState::Asleep);
                        } else {
                            scheduler.on_state_change(SleepState::Awake);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        scheduler.shutdown();
        std::thread::sleep(Duration::from_millis(20));

        // Every arming ends in exactly one of: cancelled, performed.
        let received: Vec<LockEvent> = events.try_iter().collect();
        let armed = received
            .iter()
            .filter(|e| matches!(e, LockEvent::Armed { .. }))
            .count();
        let cancelled = received
            .iter()
            .filter(|e| matches!(e, LockEvent::Cancelled))
            .count();
        let performed = actuator.calls.load(Ordering::SeqCst);
        assert_eq!(armed, cancelled + performed);
    }
}
