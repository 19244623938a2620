use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const MINUTES_PER_HOUR: u32 = 60;
pub const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;
pub const SECONDS_PER_MINUTE: u32 = 60;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlertState {
    Idle,
    OnAlert,
}

impl Default for AlertState {
    fn default() -> Self {
        AlertState::Idle
    }
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Idle => "IDLE",
            AlertState::OnAlert => "ON_ALERT",
        }
    }
}

/// Raised when a scheduler is built from out-of-range values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PitWindowError {
    #[error("invalid configuration: {field} = {value} ({reason})")]
    InvalidConfiguration {
        field: &'static str,
        value: u32,
        reason: &'static str,
    },
}

/// One reading of the wall clock. Only hour/minute decide window membership;
/// the second refines the progress indicator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WallClock {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl WallClock {
    pub fn new(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    pub fn from_time<T: Timelike>(time: &T) -> Self {
        Self::new(time.hour(), time.minute(), time.second())
    }

    pub fn minutes_of_day(&self) -> u32 {
        self.hour * MINUTES_PER_HOUR + self.minute
    }

    pub fn seconds_of_day(&self) -> u32 {
        self.minutes_of_day() * SECONDS_PER_MINUTE + self.second
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }
}

/// A window boundary, counted in whole minutes from midnight of the race day.
///
/// Boundaries that fall after midnight keep counting past 24:00 rather than
/// wrapping, so `day_offset()` tells the caller the boundary is tomorrow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct WindowTime {
    minutes: u64,
}

impl WindowTime {
    pub(crate) fn from_minutes(minutes: u64) -> Self {
        Self { minutes }
    }

    pub fn minutes_since_midnight(&self) -> u64 {
        self.minutes
    }

    pub fn hour(&self) -> u32 {
        ((self.minutes % u64::from(MINUTES_PER_DAY)) / u64::from(MINUTES_PER_HOUR)) as u32
    }

    pub fn minute(&self) -> u32 {
        (self.minutes % u64::from(MINUTES_PER_HOUR)) as u32
    }

    pub fn day_offset(&self) -> u64 {
        self.minutes / u64::from(MINUTES_PER_DAY)
    }

    pub fn to_naive_time(&self) -> NaiveTime {
        // hour() < 24 and minute() < 60, so this is always Some
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or_default()
    }

    /// Seconds from `now` until this boundary; negative once it has passed.
    pub fn seconds_after(&self, now: WallClock) -> i64 {
        self.minutes as i64 * i64::from(SECONDS_PER_MINUTE) - i64::from(now.seconds_of_day())
    }
}

impl fmt::Display for WindowTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}
