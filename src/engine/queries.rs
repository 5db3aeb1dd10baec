use std::time::Instant;

use chrono::{Days, NaiveDate, NaiveTime};
use serde::Serialize;

use crate::model::*;
use crate::observability;

use super::conflict::{bookings_near, check_booking_window, resolve_bookable_slots};
use super::{Engine, EngineError, SharedCoachState};

/// Packages at or below this many remaining sessions get a "running low" notice.
pub const LOW_SESSIONS_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoachInfo {
    pub id: CoachId,
    pub name: Option<String>,
}

impl Engine {
    /// Start times a member may book with `coach_id` on `date`, ascending.
    ///
    /// Unknown coaches and dates outside `[today, today + horizon]` list as empty.
    pub async fn bookable_slots(
        &self,
        coach_id: CoachId,
        date: NaiveDate,
    ) -> Result<Vec<NaiveTime>, EngineError> {
        let started = Instant::now();
        metrics::counter!(observability::SLOT_QUERIES_TOTAL).increment(1);

        let now = self.policy.to_local(self.now_ms())?;
        if check_booking_window(date, now.date(), self.policy.horizon_days).is_err() {
            return Ok(vec![]);
        }
        let cs = match self.get_coach(&coach_id) {
            Some(cs) => cs,
            None => return Ok(vec![]),
        };
        let guard = cs.read().await;
        let near = bookings_near(&guard, date, &self.policy);
        let slots = resolve_bookable_slots(date, &guard.weekly, &near, now, &self.policy);
        drop(guard);

        metrics::histogram!(observability::SLOT_QUERY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(slots)
    }

    /// Dates in the booking window that still have at least one bookable slot.
    pub async fn bookable_dates(&self, coach_id: CoachId) -> Result<Vec<NaiveDate>, EngineError> {
        let now = self.policy.to_local(self.now_ms())?;
        let cs = match self.get_coach(&coach_id) {
            Some(cs) => cs,
            None => return Ok(vec![]),
        };
        let guard = cs.read().await;
        let mut dates = Vec::new();
        for offset in 0..=u64::from(self.policy.horizon_days) {
            let Some(date) = now.date().checked_add_days(Days::new(offset)) else {
                break;
            };
            let near = bookings_near(&guard, date, &self.policy);
            if !resolve_bookable_slots(date, &guard.weekly, &near, now, &self.policy).is_empty() {
                dates.push(date);
            }
        }
        Ok(dates)
    }

    pub async fn weekly_availability(
        &self,
        coach_id: CoachId,
    ) -> Result<Vec<WeeklyAvailability>, EngineError> {
        let cs = self
            .get_coach(&coach_id)
            .ok_or(EngineError::NotFound(coach_id))?;
        let guard = cs.read().await;
        Ok(guard.weekly.clone())
    }

    pub async fn list_coaches(&self) -> Vec<CoachInfo> {
        let coaches = self.coaches();
        let mut out = Vec::with_capacity(coaches.len());
        for cs in coaches {
            let guard = cs.read().await;
            out.push(CoachInfo {
                id: guard.id,
                name: guard.name.clone(),
            });
        }
        out.sort_by_key(|c| c.id);
        out
    }

    pub async fn get_booking(&self, id: BookingId) -> Result<Booking, EngineError> {
        let coach_id = self
            .get_coach_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let cs = self
            .get_coach(&coach_id)
            .ok_or(EngineError::NotFound(coach_id))?;
        let guard = cs.read().await;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Every booking of the coach, any status, by start time.
    pub async fn get_bookings(&self, coach_id: CoachId) -> Result<Vec<Booking>, EngineError> {
        let cs = match self.get_coach(&coach_id) {
            Some(cs) => cs,
            None => return Ok(vec![]),
        };
        let guard = cs.read().await;
        Ok(guard.bookings.clone())
    }

    /// Bookings of the coach overlapping `span`, any status.
    pub async fn bookings_between(
        &self,
        coach_id: CoachId,
        span: Span,
    ) -> Result<Vec<Booking>, EngineError> {
        let cs = match self.get_coach(&coach_id) {
            Some(cs) => cs,
            None => return Ok(vec![]),
        };
        let guard = cs.read().await;
        Ok(guard.overlapping(&span).cloned().collect())
    }

    /// A member's bookings across all coaches, by start time.
    pub async fn member_bookings(&self, member_id: MemberId) -> Vec<Booking> {
        let mut out = Vec::new();
        for cs in self.coaches() {
            let guard = cs.read().await;
            out.extend(guard.bookings.iter().filter(|b| b.member_id == member_id).cloned());
        }
        out.sort_by_key(|b| b.scheduled_at);
        out
    }

    pub async fn get_packages(&self, coach_id: CoachId) -> Result<Vec<SessionPackage>, EngineError> {
        let cs = match self.get_coach(&coach_id) {
            Some(cs) => cs,
            None => return Ok(vec![]),
        };
        let guard = cs.read().await;
        Ok(guard.packages.clone())
    }

    pub async fn member_packages(&self, member_id: MemberId) -> Vec<SessionPackage> {
        let mut out = Vec::new();
        for cs in self.coaches() {
            let guard = cs.read().await;
            out.extend(guard.packages.iter().filter(|p| p.member_id == member_id).cloned());
        }
        out.sort_by_key(|p| p.purchased_at);
        out
    }

    /// Scheduled bookings on tomorrow's local date.
    pub async fn due_reminders(&self) -> Result<Vec<Booking>, EngineError> {
        let today = self.policy.today(self.now_ms())?;
        let Some(tomorrow) = today.checked_add_days(Days::new(1)) else {
            return Ok(vec![]);
        };
        let start = local_instant(tomorrow, NaiveTime::MIN, self.policy.offset);
        let day = Span::new(start, start + 24 * 3_600_000);

        let mut out = Vec::new();
        for cs in self.coaches() {
            let guard = cs.read().await;
            out.extend(
                guard
                    .overlapping(&day)
                    .filter(|b| b.status == BookingStatus::Scheduled && day.contains_instant(b.scheduled_at))
                    .cloned(),
            );
        }
        out.sort_by_key(|b| b.scheduled_at);
        Ok(out)
    }

    /// Active packages with between one and [`LOW_SESSIONS_THRESHOLD`] sessions left.
    pub async fn low_packages(&self) -> Vec<SessionPackage> {
        let mut out = Vec::new();
        for cs in self.coaches() {
            let guard = cs.read().await;
            out.extend(
                guard
                    .packages
                    .iter()
                    .filter(|p| p.is_usable() && p.remaining_sessions <= LOW_SESSIONS_THRESHOLD)
                    .cloned(),
            );
        }
        out
    }

    fn coaches(&self) -> Vec<SharedCoachState> {
        self.state.iter().map(|e| e.value().clone()).collect()
    }
}
