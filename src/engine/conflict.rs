use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::availability::{available_times_for_date, merge_overlapping};
use super::policy::{BookingPolicy, PastCutoff, SlotFit};

const DAY_MS: Ms = 24 * 3_600_000;

// ── Conflict Guard ────────────────────────────────────────────────

/// Bookable start times for `date`: the resolver's candidates minus slots
/// taken by a non-cancelled booking (plus buffer) and slots already passed.
///
/// `bookings` may hold any of the coach's bookings; cancelled ones and
/// those nowhere near `date` are ignored. `now` is the gym's wall clock.
/// Date-range gating is the caller's job (see [`check_booking_window`]).
pub fn resolve_bookable_slots(
    date: NaiveDate,
    weekly: &[WeeklyAvailability],
    bookings: &[Booking],
    now: NaiveDateTime,
    policy: &BookingPolicy,
) -> Vec<NaiveTime> {
    let candidates = available_times_for_date(date, weekly, policy);
    if candidates.is_empty() {
        return candidates;
    }

    let buffer = policy.buffer_ms();
    let mut taken: Vec<Span> = bookings
        .iter()
        .filter(|b| b.status.blocks_slot())
        .map(|b| b.span().extended(buffer))
        .collect();
    taken.sort_by_key(|s| s.start);
    let taken = merge_overlapping(&taken);

    candidates
        .into_iter()
        .filter(|t| !is_past(date, *t, now, policy.cutoff))
        .filter(|t| {
            let at = local_instant(date, *t, policy.offset);
            // With a buffer the new session's own cleanup window counts too,
            // so the hour-only check would list slots the commit rejects.
            match policy.fit {
                SlotFit::HourWindow if buffer == 0 => !taken.iter().any(|s| s.contains_instant(at)),
                SlotFit::HourWindow | SlotFit::FullSession => {
                    let wanted = Span::new(at, at + policy.session_ms() + buffer);
                    !taken.iter().any(|s| s.overlaps(&wanted))
                }
            }
        })
        .collect()
}

fn is_past(date: NaiveDate, time: NaiveTime, now: NaiveDateTime, cutoff: PastCutoff) -> bool {
    if date != now.date() {
        return date < now.date();
    }
    match cutoff {
        PastCutoff::SameHour => time.hour() <= now.hour(),
        PastCutoff::Exact => date.and_time(time) <= now,
    }
}

/// Reject dates before `today` or more than `horizon_days` after it.
pub fn check_booking_window(
    date: NaiveDate,
    today: NaiveDate,
    horizon_days: u32,
) -> Result<(), EngineError> {
    let last = today
        .checked_add_days(Days::new(u64::from(horizon_days)))
        .ok_or(EngineError::InvalidRange(date))?;
    if date < today || date > last {
        return Err(EngineError::InvalidRange(date));
    }
    Ok(())
}

/// Clone of every booking that can influence slots on `date`.
pub(crate) fn bookings_near(cs: &CoachState, date: NaiveDate, policy: &BookingPolicy) -> Vec<Booking> {
    let midnight = local_instant(date, NaiveTime::MIN, policy.offset);
    let window = Span::new(midnight - policy.buffer_ms(), midnight + DAY_MS);
    cs.overlapping(&window).cloned().collect()
}

pub(crate) fn validate_booking_span(scheduled_at: Ms, duration_minutes: u32) -> Result<Span, EngineError> {
    if duration_minutes == 0 {
        return Err(EngineError::InvalidInput("duration must be positive"));
    }
    if duration_minutes > MAX_SESSION_MINUTES {
        return Err(EngineError::LimitExceeded("session too long"));
    }
    let end = Ms::from(duration_minutes)
        .checked_mul(MINUTE_MS)
        .and_then(|len| scheduled_at.checked_add(len))
        .ok_or(EngineError::LimitExceeded("timestamp out of range"))?;
    if scheduled_at < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(Span::new(scheduled_at, end))
}

/// Full-span check of a new booking against every slot-holding booking,
/// with `buffer` after each session on both sides.
pub(crate) fn check_no_conflict(cs: &CoachState, span: &Span, buffer: Ms) -> Result<(), EngineError> {
    // Widen the search so bookings whose buffer reaches into `span` are seen.
    let search = Span::new(span.start - buffer, span.end + buffer);
    let wanted = span.extended(buffer);
    for booking in cs.overlapping(&search) {
        if !booking.status.blocks_slot() {
            continue;
        }
        if booking.span().extended(buffer).overlaps(span) || wanted.overlaps(&booking.span()) {
            return Err(EngineError::SlotConflict(booking.id));
        }
    }
    Ok(())
}
