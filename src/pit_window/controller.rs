use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::settings::PitWindowSettings;

use super::{AlertState, PitWindowScheduler, PitWindowSnapshot, WallClock};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

pub const DEBUG_ENV: &str = "PITSTOPPER_DEBUG";
const EVENT_CAPACITY: usize = 64;

/// Source of wall-clock readings for the sampling loop.
pub trait Clock: Send + Sync {
    fn now(&self) -> WallClock;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> WallClock {
        WallClock::from_time(&Local::now())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PitWindowEvent {
    Tick(PitWindowSnapshot),
    StateChanged {
        previous: AlertState,
        snapshot: PitWindowSnapshot,
    },
    Acknowledged {
        window: u64,
        snapshot: PitWindowSnapshot,
    },
    Reconfigured(PitWindowSettings),
}

/// Ticks between info-level summaries: every tick in debug mode, else every 10th.
fn summary_cadence(debug_value: Option<&str>) -> u32 {
    match debug_value {
        Some(value) if value == "1" || value.eq_ignore_ascii_case("true") => 1,
        _ => 10,
    }
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Samples the clock once per tick and publishes dashboard snapshots.
///
/// The scheduler sits behind an async mutex so `acknowledge` from an input
/// handler never races a tick's classification.
#[derive(Clone)]
pub struct PitWindowController {
    scheduler: Arc<Mutex<PitWindowScheduler>>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<PitWindowEvent>,
    ticker: Arc<Mutex<Option<Ticker>>>,
    tick_interval: Duration,
    summary_every_ticks: u32,
}

impl PitWindowController {
    pub fn new(settings: &PitWindowSettings) -> Result<Self> {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: &PitWindowSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        let scheduler = settings
            .build_scheduler()
            .context("Invalid pit window settings")?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            scheduler: Arc::new(Mutex::new(scheduler)),
            clock,
            events,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
            summary_every_ticks: summary_cadence(std::env::var(DEBUG_ENV).ok().as_deref()),
        })
    }

    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PitWindowEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> PitWindowSnapshot {
        let guard = self.scheduler.lock().await;
        PitWindowSnapshot::capture(&guard, self.clock.now())
    }

    /// Silences the window that is alerting right now. Buttons and any
    /// "car stopped in the pits" detector call this.
    pub async fn acknowledge(&self) -> PitWindowSnapshot {
        let mut guard = self.scheduler.lock().await;
        let clock = self.clock.now();

        if guard.acknowledge(clock.hour, clock.minute) {
            let snapshot = PitWindowSnapshot::capture(&guard, clock);
            if let Some(window) = guard.suppressed_window() {
                log_info!("Pit window #{} acknowledged at {}", window + 1, clock);
                let _ = self.events.send(PitWindowEvent::Acknowledged {
                    window,
                    snapshot: snapshot.clone(),
                });
            }
            snapshot
        } else {
            log_debug!("Acknowledge at {} ignored: no alerting window", clock);
            PitWindowSnapshot::capture(&guard, clock)
        }
    }

    /// Swaps in a scheduler built from `settings`. Any suppression is dropped
    /// along with the old scheduler.
    pub async fn reconfigure(&self, settings: &PitWindowSettings) -> Result<()> {
        let scheduler = match settings.build_scheduler() {
            Ok(scheduler) => scheduler,
            Err(err) => {
                log_warn!("Keeping previous pit window schedule: {}", err);
                return Err(err).context("Invalid pit window settings");
            }
        };

        *self.scheduler.lock().await = scheduler;
        log_info!(
            "Pit window schedule: race start {}, opens after {} min, {} min windows",
            settings.race_start_formatted(),
            settings.pit_window_opens_after,
            settings.pit_window_duration
        );
        let _ = self.events.send(PitWindowEvent::Reconfigured(*settings));
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.ticker.lock().await.is_some()
    }

    pub async fn start(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(previous) = ticker_guard.take() {
            previous.cancel_token.cancel();
            previous.handle.abort();
        }

        let scheduler = self.scheduler.clone();
        let clock = self.clock.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let summary_every = self.summary_every_ticks.max(1);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut previous_state = AlertState::Idle;
            let mut ticks: u32 = 0;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = {
                            let guard = scheduler.lock().await;
                            PitWindowSnapshot::capture(&guard, clock.now())
                        };

                        if snapshot.state != previous_state {
                            log_info!(
                                "Alert state {} -> {} at {}",
                                previous_state.as_str(),
                                snapshot.state.as_str(),
                                snapshot.clock
                            );
                            let _ = events.send(PitWindowEvent::StateChanged {
                                previous: previous_state,
                                snapshot: snapshot.clone(),
                            });
                            previous_state = snapshot.state;
                        }

                        ticks = ticks.wrapping_add(1);
                        if ticks % summary_every == 0 {
                            log_info!("{}", snapshot.summary());
                        } else {
                            log_debug!("{}", snapshot.summary());
                        }

                        let _ = events.send(PitWindowEvent::Tick(snapshot));
                    }
                    _ = token.cancelled() => {
                        log_info!("pit window ticker shutting down");
                        break;
                    }
                }
            }
        });

        *ticker_guard = Some(Ticker {
            handle,
            cancel_token,
        });
    }

    pub async fn stop(&self) {
        let ticker = self.ticker.lock().await.take();
        if let Some(ticker) = ticker {
            ticker.cancel_token.cancel();
            let _ = ticker.handle.await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    pub(crate) struct ManualClock(StdMutex<WallClock>);

    impl ManualClock {
        pub(crate) fn at(hour: u32, minute: u32, second: u32) -> Arc<Self> {
            Arc::new(Self(StdMutex::new(WallClock::new(hour, minute, second))))
        }

        pub(crate) fn set(&self, hour: u32, minute: u32, second: u32) {
            *self.0.lock().unwrap() = WallClock::new(hour, minute, second);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> WallClock {
            *self.0.lock().unwrap()
        }
    }

    fn controller(clock: Arc<ManualClock>) -> PitWindowController {
        PitWindowController::with_clock(&PitWindowSettings::default(), clock).unwrap()
    }

    async fn next_state_change(
        rx: &mut broadcast::Receiver<PitWindowEvent>,
    ) -> (AlertState, PitWindowSnapshot) {
        time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(PitWindowEvent::StateChanged { previous, snapshot }) => {
                        return (previous, snapshot)
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("no state change within timeout")
    }

    #[test]
    fn test_summary_cadence() {
        assert_eq!(summary_cadence(None), 10);
        assert_eq!(summary_cadence(Some("0")), 10);
        assert_eq!(summary_cadence(Some("1")), 1);
        assert_eq!(summary_cadence(Some("TRUE")), 1);
    }

    #[tokio::test]
    async fn test_snapshot_reads_injected_clock() {
        let clock = ManualClock::at(9, 20, 0);
        let controller = controller(clock.clone());
        let snap = controller.snapshot().await;
        assert_eq!(snap.state, AlertState::OnAlert);
        assert_eq!(snap.progress, 50);

        clock.set(9, 30, 0);
        assert_eq!(controller.snapshot().await.state, AlertState::Idle);
    }

    #[tokio::test]
    async fn test_rejects_invalid_settings() {
        let settings = PitWindowSettings {
            race_start_hour: 25,
            ..PitWindowSettings::default()
        };
        assert!(PitWindowController::with_clock(&settings, ManualClock::at(9, 0, 0)).is_err());
    }

    #[tokio::test]
    async fn test_acknowledge_broadcasts_once() {
        let clock = ManualClock::at(9, 18, 0);
        let controller = controller(clock.clone());
        let mut rx = controller.subscribe();

        let snap = controller.acknowledge().await;
        assert_eq!(snap.state, AlertState::Idle);
        match rx.try_recv() {
            Ok(PitWindowEvent::Acknowledged { window, .. }) => assert_eq!(window, 0),
            other => panic!("expected Acknowledged, got {:?}", other),
        }

        controller.acknowledge().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        clock.set(9, 37, 0);
        assert_eq!(controller.snapshot().await.state, AlertState::OnAlert);
    }

    #[tokio::test]
    async fn test_acknowledge_while_idle_is_ignored() {
        let clock = ManualClock::at(9, 10, 0);
        let controller = controller(clock.clone());
        let mut rx = controller.subscribe();

        controller.acknowledge().await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        clock.set(9, 17, 0);
        assert_eq!(controller.snapshot().await.state, AlertState::OnAlert);
    }

    #[tokio::test]
    async fn test_reconfigure_clears_suppression() {
        let clock = ManualClock::at(9, 18, 0);
        let controller = controller(clock);
        controller.acknowledge().await;
        assert_eq!(controller.snapshot().await.state, AlertState::Idle);

        controller
            .reconfigure(&PitWindowSettings::default())
            .await
            .unwrap();
        assert_eq!(controller.snapshot().await.state, AlertState::OnAlert);

        let invalid = PitWindowSettings {
            pit_window_duration: 0,
            ..PitWindowSettings::default()
        };
        assert!(controller.reconfigure(&invalid).await.is_err());
        assert_eq!(controller.snapshot().await.state, AlertState::OnAlert);
    }

    #[tokio::test]
    async fn test_ticker_publishes_ticks_and_transitions() {
        let clock = ManualClock::at(9, 16, 58);
        let controller = controller(clock.clone()).with_tick_interval(Duration::from_millis(10));
        let mut rx = controller.subscribe();

        controller.start().await;
        assert!(controller.is_running().await);

        let first_tick = time::timeout(Duration::from_secs(2), async {
            loop {
                match rx.recv().await {
                    Ok(PitWindowEvent::Tick(snapshot)) => return snapshot,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("no tick within timeout");
        assert_eq!(first_tick.state, AlertState::Idle);

        clock.set(9, 17, 0);
        let (previous, snapshot) = next_state_change(&mut rx).await;
        assert_eq!(previous, AlertState::Idle);
        assert_eq!(snapshot.state, AlertState::OnAlert);

        controller.stop().await;
        assert!(!controller.is_running().await);
    }

    #[tokio::test]
    async fn test_acknowledge_while_ticking_reports_idle_transition() {
        let clock = ManualClock::at(9, 18, 0);
        let controller = controller(clock).with_tick_interval(Duration::from_millis(10));
        let mut rx = controller.subscribe();

        controller.start().await;
        let (previous, snapshot) = next_state_change(&mut rx).await;
        assert_eq!(previous, AlertState::Idle);
        assert_eq!(snapshot.state, AlertState::OnAlert);

        controller.acknowledge().await;
        let (previous, snapshot) = next_state_change(&mut rx).await;
        assert_eq!(previous, AlertState::OnAlert);
        assert_eq!(snapshot.state, AlertState::Idle);
        assert_eq!(snapshot.progress, 16);

        controller.stop().await;
    }
}
