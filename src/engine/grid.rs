use chrono::NaiveTime;

use super::EngineError;

pub const DEFAULT_FIRST_HOUR: u32 = 6;
pub const DEFAULT_LAST_HOUR: u32 = 21;
pub const DEFAULT_STEP_MINUTES: u32 = 60;

/// The fixed universe of start times within a business day.
///
/// Entries run from `first_hour:00` through `last_hour:00` inclusive, every
/// `step_minutes`. The default grid is the top of every hour from 06:00 to
/// 21:00 (16 entries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotGrid {
    first_hour: u32,
    last_hour: u32,
    step_minutes: u32,
}

impl Default for SlotGrid {
    fn default() -> Self {
        Self {
            first_hour: DEFAULT_FIRST_HOUR,
            last_hour: DEFAULT_LAST_HOUR,
            step_minutes: DEFAULT_STEP_MINUTES,
        }
    }
}

impl SlotGrid {
    pub fn new(first_hour: u32, last_hour: u32, step_minutes: u32) -> Result<Self, EngineError> {
        if last_hour > 23 {
            return Err(EngineError::InvalidInput("grid hour must be 0..=23"));
        }
        if first_hour > last_hour {
            return Err(EngineError::InvalidInput("grid first hour after last hour"));
        }
        if step_minutes == 0 || step_minutes > 24 * 60 {
            return Err(EngineError::InvalidInput("grid step must be 1..=1440 minutes"));
        }
        Ok(Self {
            first_hour,
            last_hour,
            step_minutes,
        })
    }

    pub fn first_hour(&self) -> u32 {
        self.first_hour
    }

    pub fn last_hour(&self) -> u32 {
        self.last_hour
    }

    pub fn step_minutes(&self) -> u32 {
        self.step_minutes
    }

    /// Ascending, duplicate-free start times.
    pub fn slots(&self) -> Vec<NaiveTime> {
        let first = self.first_hour * 60;
        let last = self.last_hour * 60;
        (first..=last)
            .step_by(self.step_minutes as usize)
            .filter_map(|m| NaiveTime::from_hms_opt(m / 60, m % 60, 0))
            .collect()
    }
}
