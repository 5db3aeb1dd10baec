use chrono::{FixedOffset, NaiveDate, NaiveDateTime, Offset, Utc};

use crate::limits::*;
use crate::model::{Ms, MINUTE_MS, local_datetime};

use super::EngineError;
use super::grid::SlotGrid;

pub const DEFAULT_HORIZON_DAYS: u32 = 14;
pub const DEFAULT_SESSION_MINUTES: u32 = 60;

/// How a grid entry is matched against a coach's daily window and existing bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotFit {
    /// Slot hour within `[start.hour, end.hour)`; a slot is taken when its
    /// start instant falls inside a booking.
    #[default]
    HourWindow,
    /// The whole session must fit inside the window and must not overlap
    /// any booking.
    FullSession,
}

/// How slots on today's date are cut off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PastCutoff {
    /// Drop every slot whose hour is `<=` the current hour.
    #[default]
    SameHour,
    /// Drop every slot whose start instant is `<=` now.
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingPolicy {
    pub grid: SlotGrid,
    /// Furthest bookable date, in days after today (inclusive).
    pub horizon_days: u32,
    pub session_minutes: u32,
    /// Blocked time after every booking.
    pub buffer_minutes: u32,
    pub fit: SlotFit,
    pub cutoff: PastCutoff,
    /// The gym's wall clock.
    pub offset: FixedOffset,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            grid: SlotGrid::default(),
            horizon_days: DEFAULT_HORIZON_DAYS,
            session_minutes: DEFAULT_SESSION_MINUTES,
            buffer_minutes: 0,
            fit: SlotFit::default(),
            cutoff: PastCutoff::default(),
            offset: Utc.fix(),
        }
    }
}

impl BookingPolicy {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.horizon_days > MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("booking horizon too long"));
        }
        if self.session_minutes == 0 || self.session_minutes > MAX_SESSION_MINUTES {
            return Err(EngineError::InvalidInput("session length out of range"));
        }
        if self.buffer_minutes > MAX_SESSION_MINUTES {
            return Err(EngineError::InvalidInput("buffer out of range"));
        }
        Ok(())
    }

    pub fn session_ms(&self) -> Ms {
        Ms::from(self.session_minutes) * MINUTE_MS
    }

    pub fn buffer_ms(&self) -> Ms {
        Ms::from(self.buffer_minutes) * MINUTE_MS
    }

    /// Wall-clock reading of `ms` at the gym.
    pub fn to_local(&self, ms: Ms) -> Result<NaiveDateTime, EngineError> {
        local_datetime(ms, self.offset).ok_or(EngineError::InvalidInput("timestamp out of range"))
    }

    pub fn today(&self, now: Ms) -> Result<NaiveDate, EngineError> {
        Ok(self.to_local(now)?.date())
    }
}
