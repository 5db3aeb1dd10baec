use chrono::{NaiveDate, NaiveTime, Timelike};

use crate::model::*;

use super::policy::{BookingPolicy, SlotFit};

// ── Availability Resolver ─────────────────────────────────────────

/// Candidate start times for `date` from the coach's weekly pattern alone.
///
/// A missing or closed row for the weekday yields nothing. Otherwise the
/// slot grid is filtered to the day's window, end-exclusive: a slot starting
/// at closing time never fits a session.
///
/// `HourWindow` compares whole hours only (a 09:30–16:30 window admits
/// 09:00 through 15:00). `FullSession` requires
/// `start <= slot && slot + session <= end`.
pub fn available_times_for_date(
    date: NaiveDate,
    weekly: &[WeeklyAvailability],
    policy: &BookingPolicy,
) -> Vec<NaiveTime> {
    let day = day_index(date);
    let Some(row) = weekly.iter().find(|r| r.day_of_week == day) else {
        return Vec::new();
    };
    if !row.is_available {
        return Vec::new();
    }

    let slots = policy.grid.slots();
    match policy.fit {
        SlotFit::HourWindow => {
            let (open, close) = (row.start_time.hour(), row.end_time.hour());
            slots
                .into_iter()
                .filter(|t| t.hour() >= open && t.hour() < close)
                .collect()
        }
        SlotFit::FullSession => {
            let close = minute_of_day(row.end_time);
            slots
                .into_iter()
                .filter(|t| *t >= row.start_time && minute_of_day(*t) + policy.session_minutes <= close)
                .collect()
        }
    }
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}
