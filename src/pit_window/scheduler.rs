//! Recurring pit window schedule.
//!
//! The first window opens `opens_after_minutes` after race start and every
//! window lasts `duration_minutes`. Windows then repeat every
//! `opens_after + ceil(duration / 2)` minutes, forever. For a race at 09:00
//! opening after 17 minutes with 6 minute windows that gives 09:17-09:23,
//! 09:37-09:43, 09:57-10:03 and so on.
//!
//! Known limitations carried over on purpose:
//! - the cycle heuristic is not checked against the duration, so extreme
//!   inputs (cycle <= duration) produce back-to-back or overlapping windows;
//! - the schedule is same-day only. A clock reading earlier than race start is
//!   treated as "before the race", even for a race that runs past midnight.

use super::state::{
    AlertState, PitWindowError, WindowTime, MINUTES_PER_HOUR, SECONDS_PER_MINUTE,
};

const MINUTE: i64 = SECONDS_PER_MINUTE as i64;

/// Where a clock reading sits relative to the window sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindowOccurrence {
    /// Zero-based ordinal of the cycle since the first window opened.
    index: u64,
    /// Minutes since that cycle's window opened.
    position_in_cycle: i64,
}

#[derive(Debug, Clone)]
pub struct PitWindowScheduler {
    race_start_hour: u32,
    race_start_minute: u32,
    opens_after_minutes: u32,
    duration_minutes: u32,
    cycle_minutes: u32,
    /// Window occurrence silenced by `acknowledge`; inert once the clock moves
    /// into any other occurrence.
    suppressed_window: Option<u64>,
}

impl PitWindowScheduler {
    pub fn new(
        race_start_hour: u32,
        race_start_minute: u32,
        opens_after_minutes: u32,
        duration_minutes: u32,
    ) -> Result<Self, PitWindowError> {
        if race_start_hour > 23 {
            return Err(invalid("race_start_hour", race_start_hour, "must be within 0..=23"));
        }
        if race_start_minute > 59 {
            return Err(invalid(
                "race_start_minute",
                race_start_minute,
                "must be within 0..=59",
            ));
        }
        if duration_minutes == 0 {
            return Err(invalid("duration_minutes", duration_minutes, "must be at least 1"));
        }

        let half_duration = duration_minutes / 2 + duration_minutes % 2;
        let cycle_minutes = opens_after_minutes
            .checked_add(half_duration)
            .ok_or_else(|| {
                invalid(
                    "opens_after_minutes",
                    opens_after_minutes,
                    "repeat cycle overflows",
                )
            })?;

        Ok(Self {
            race_start_hour,
            race_start_minute,
            opens_after_minutes,
            duration_minutes,
            cycle_minutes,
            suppressed_window: None,
        })
    }

    pub fn race_start(&self) -> WindowTime {
        WindowTime::from_minutes(u64::from(self.race_start_minutes()))
    }

    pub fn opens_after_minutes(&self) -> u32 {
        self.opens_after_minutes
    }

    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    pub fn cycle_minutes(&self) -> u32 {
        self.cycle_minutes
    }

    pub fn suppressed_window(&self) -> Option<u64> {
        self.suppressed_window
    }

    /// Alert state for a clock reading. A window silenced by `acknowledge`
    /// reports `Idle` for the rest of that occurrence.
    pub fn classify(&self, hour: u32, minute: u32) -> AlertState {
        match self.active_occurrence(hour, minute) {
            Some(occurrence) if self.suppressed_window != Some(occurrence.index) => {
                AlertState::OnAlert
            }
            _ => AlertState::Idle,
        }
    }

    /// Whether the reading falls inside a window, suppressed or not.
    pub fn is_in_window(&self, hour: u32, minute: u32) -> bool {
        self.active_occurrence(hour, minute).is_some()
    }

    /// Silences the window that is currently alerting. Returns `false` (and
    /// changes nothing) when the reading is idle or the window is already
    /// silenced.
    pub fn acknowledge(&mut self, hour: u32, minute: u32) -> bool {
        match self.active_occurrence(hour, minute) {
            Some(occurrence) if self.suppressed_window != Some(occurrence.index) => {
                self.suppressed_window = Some(occurrence.index);
                true
            }
            _ => false,
        }
    }

    /// Percentage (0..=100, floored) through the current stage, where a stage
    /// is either the gap before a window or the window itself. Floor keeps the
    /// bar below 100 while the window is still open.
    pub fn progress_in_current_stage(&self, hour: u32, minute: u32, second: u32) -> u8 {
        let Some(since_start) = self.minutes_since_start(hour, minute) else {
            return 0;
        };
        let second = i64::from(second.min(SECONDS_PER_MINUTE - 1));
        let duration = i64::from(self.duration_minutes);

        let (elapsed_secs, total_secs) = match self.occurrence(since_start) {
            // first gap: race start up to the first window
            None => (
                since_start * MINUTE + second,
                i64::from(self.opens_after_minutes) * MINUTE,
            ),
            Some(occurrence) if occurrence.position_in_cycle < duration => (
                occurrence.position_in_cycle * MINUTE + second,
                duration * MINUTE,
            ),
            Some(occurrence) => (
                (occurrence.position_in_cycle - duration) * MINUTE + second,
                (i64::from(self.cycle_minutes) - duration) * MINUTE,
            ),
        };

        percent(elapsed_secs, total_secs)
    }

    /// End of the window the reading sits in, ignoring suppression so a
    /// countdown can still be shown. `None` between windows.
    pub fn current_window_end(&self, hour: u32, minute: u32) -> Option<WindowTime> {
        let since_start = self.minutes_since_start(hour, minute)?;
        let occurrence = self.occurrence(since_start)?;
        let duration = i64::from(self.duration_minutes);
        if occurrence.position_in_cycle >= duration {
            return None;
        }
        Some(self.boundary(since_start + duration - occurrence.position_in_cycle))
    }

    /// Start of the next window. Inside a window this is the following
    /// occurrence, not the current one.
    pub fn next_window_start(&self, hour: u32, minute: u32) -> WindowTime {
        let since_start = clock_minutes(hour, minute) - i64::from(self.race_start_minutes());
        let opens_after = i64::from(self.opens_after_minutes);
        if since_start < opens_after {
            return self.boundary(opens_after);
        }

        let cycle = i64::from(self.cycle_minutes);
        let position_in_cycle = (since_start - opens_after) % cycle;
        self.boundary(since_start + cycle - position_in_cycle)
    }

    fn race_start_minutes(&self) -> u32 {
        self.race_start_hour * MINUTES_PER_HOUR + self.race_start_minute
    }

    /// Minutes since race start, or `None` before the race (same day only).
    fn minutes_since_start(&self, hour: u32, minute: u32) -> Option<i64> {
        let since_start = clock_minutes(hour, minute) - i64::from(self.race_start_minutes());
        (since_start >= 0).then_some(since_start)
    }

    fn occurrence(&self, since_start: i64) -> Option<WindowOccurrence> {
        let opens_after = i64::from(self.opens_after_minutes);
        if since_start < opens_after {
            return None;
        }

        let cycle = i64::from(self.cycle_minutes);
        let elapsed_since_first_open = since_start - opens_after;
        Some(WindowOccurrence {
            index: (elapsed_since_first_open / cycle) as u64,
            position_in_cycle: elapsed_since_first_open % cycle,
        })
    }

    fn active_occurrence(&self, hour: u32, minute: u32) -> Option<WindowOccurrence> {
        let since_start = self.minutes_since_start(hour, minute)?;
        self.occurrence(since_start)
            .filter(|occurrence| occurrence.position_in_cycle < i64::from(self.duration_minutes))
    }

    fn boundary(&self, minutes_after_start: i64) -> WindowTime {
        let minutes = i64::from(self.race_start_minutes()) + minutes_after_start;
        WindowTime::from_minutes(minutes.max(0) as u64)
    }
}

fn invalid(field: &'static str, value: u32, reason: &'static str) -> PitWindowError {
    PitWindowError::InvalidConfiguration {
        field,
        value,
        reason,
    }
}

fn clock_minutes(hour: u32, minute: u32) -> i64 {
    i64::from(hour) * i64::from(MINUTES_PER_HOUR) + i64::from(minute)
}

fn percent(elapsed_secs: i64, total_secs: i64) -> u8 {
    if total_secs <= 0 {
        return 0;
    }
    (elapsed_secs * 100 / total_secs).clamp(0, 100) as u8
}
