use serde::Serialize;
use std::fmt;

use super::{AlertState, PitWindowScheduler, WallClock, WindowTime};

/// Seconds per flash phase while alerting (green, then dark, then green...).
const FLASH_PHASE_SECS: u32 = 2;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum CountdownKind {
    UntilWindowEnd,
    UntilNextWindow,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    pub kind: CountdownKind,
    pub target: WindowTime,
    pub remaining_secs: i64,
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let remaining = self.remaining_secs.max(0);
        write!(f, "{:02}:{:02}", remaining / 60, remaining % 60)
    }
}

/// Everything the dashboard paints for one clock sample.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PitWindowSnapshot {
    pub clock: WallClock,
    pub state: AlertState,
    pub progress: u8,
    pub flash_on: bool,
    pub countdown: Countdown,
}

impl PitWindowSnapshot {
    pub fn capture(scheduler: &PitWindowScheduler, clock: WallClock) -> Self {
        let state = scheduler.classify(clock.hour, clock.minute);
        let progress = scheduler.progress_in_current_stage(clock.hour, clock.minute, clock.second);

        // A silenced window reads Idle, so it counts down to the next one.
        let (kind, target) = match (state, scheduler.current_window_end(clock.hour, clock.minute)) {
            (AlertState::OnAlert, Some(end)) => (CountdownKind::UntilWindowEnd, end),
            _ => (
                CountdownKind::UntilNextWindow,
                scheduler.next_window_start(clock.hour, clock.minute),
            ),
        };

        Self {
            clock,
            state,
            progress,
            flash_on: state == AlertState::OnAlert
                && clock.second % (2 * FLASH_PHASE_SECS) < FLASH_PHASE_SECS,
            countdown: Countdown {
                kind,
                target,
                remaining_secs: target.seconds_after(clock).max(0),
            },
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} | {} | progress {:>3}% | {} {}",
            self.clock,
            self.state.as_str(),
            self.progress,
            match self.countdown.kind {
                CountdownKind::UntilWindowEnd => "window closes in",
                CountdownKind::UntilNextWindow => "next window in",
            },
            self.countdown,
        )
    }
}
