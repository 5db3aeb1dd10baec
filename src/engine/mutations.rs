use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::{Actor, Notice};
use crate::observability;

use super::availability::available_times_for_date;
use super::conflict::{
    bookings_near, check_booking_window, check_no_conflict, resolve_bookable_slots,
    validate_booking_span,
};
use super::{Engine, EngineError};

/// A member asking for one of the listed slots.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub id: BookingId,
    pub member_id: MemberId,
    pub coach_id: CoachId,
    pub scheduled_at: Ms,
    pub duration_minutes: u32,
}

/// A coach putting a session in the calendar directly.
#[derive(Debug, Clone)]
pub struct CoachBookingRequest {
    pub id: BookingId,
    pub member_id: MemberId,
    pub coach_id: CoachId,
    pub scheduled_at: Ms,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

impl Engine {
    pub async fn register_coach(&self, id: CoachId, name: Option<String>) -> Result<(), EngineError> {
        if let Some(n) = &name
            && n.len() > MAX_NAME_LEN {
                return Err(EngineError::LimitExceeded("coach name too long"));
            }
        let _registration = self.registration.lock().await;
        if self.state.len() >= MAX_COACHES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many coaches"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::CoachRegistered { id, name: name.clone() };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(CoachState::new(id, name))));
        info!("coach {id} registered");
        Ok(())
    }

    /// Upsert the coach's row for `row.day_of_week`.
    pub async fn set_weekly_availability(&self, row: WeeklyAvailability) -> Result<(), EngineError> {
        if row.day_of_week > 6 {
            return Err(EngineError::InvalidInput("day_of_week must be 0..=6"));
        }
        if row.is_available && row.start_time >= row.end_time {
            return Err(EngineError::InvalidInput("start_time must be before end_time"));
        }
        let cs = self
            .get_coach(&row.coach_id)
            .ok_or(EngineError::NotFound(row.coach_id))?;
        let mut guard = cs.write().await;
        let event = Event::AvailabilitySet { row };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn grant_package(
        &self,
        id: PackageId,
        member_id: MemberId,
        coach_id: CoachId,
        total_sessions: u32,
    ) -> Result<SessionPackage, EngineError> {
        if total_sessions == 0 {
            return Err(EngineError::InvalidInput("package needs at least one session"));
        }
        if total_sessions > MAX_PACKAGE_SESSIONS {
            return Err(EngineError::LimitExceeded("too many sessions in package"));
        }
        let cs = self
            .get_coach(&coach_id)
            .ok_or(EngineError::NotFound(coach_id))?;
        let mut guard = cs.write().await;
        if self.entity_to_coach.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if guard.packages.len() >= MAX_PACKAGES_PER_COACH {
            return Err(EngineError::LimitExceeded("too many packages on coach"));
        }

        let package = SessionPackage {
            id,
            member_id,
            coach_id,
            total_sessions,
            remaining_sessions: total_sessions,
            status: PackageStatus::Active,
            purchased_at: self.now_ms(),
        };
        let event = Event::PackageGranted { package: package.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("package {id} granted: {total_sessions} sessions, member {member_id}, coach {coach_id}");
        Ok(package)
    }

    pub async fn expire_package(&self, id: PackageId) -> Result<(), EngineError> {
        let mut guard = self.resolve_entity_write(&id).await?;
        let package = guard.package(id).ok_or(EngineError::NotFound(id))?;
        if package.status != PackageStatus::Active {
            return Err(EngineError::InvalidInput("package is not active"));
        }
        let event = Event::PackageExpired { id, coach_id: guard.id };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// The member-facing Booking Command.
    ///
    /// Availability is re-derived under the coach's write lock, so of two
    /// requests racing for the same slot exactly one commits and the other
    /// gets `SlotConflict`.
    pub async fn book_session(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let coach_id = req.coach_id;
        let result = self.try_book_session(req).await;
        metrics::counter!(
            observability::BOOKINGS_TOTAL,
            "outcome" => observability::outcome_label(&result)
        )
        .increment(1);
        match &result {
            Ok(b) => info!("booking {} confirmed: coach {coach_id} at {}", b.id, b.scheduled_at),
            Err(e) => debug!("booking for coach {coach_id} rejected: {e}"),
        }
        result
    }

    async fn try_book_session(&self, req: BookingRequest) -> Result<Booking, EngineError> {
        let span = validate_booking_span(req.scheduled_at, req.duration_minutes)?;
        let now = self.now_ms();
        let local_now = self.policy.to_local(now)?;
        let wanted = self.policy.to_local(req.scheduled_at)?;
        let (date, time) = (wanted.date(), wanted.time());
        check_booking_window(date, local_now.date(), self.policy.horizon_days)?;

        let cs = self
            .get_coach(&req.coach_id)
            .ok_or(EngineError::NotFound(req.coach_id))?;
        let mut guard = cs.write().await;
        if self.entity_to_coach.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_COACH {
            return Err(EngineError::LimitExceeded("too many bookings on coach"));
        }

        if !available_times_for_date(date, &guard.weekly, &self.policy).contains(&time) {
            return Err(EngineError::NoAvailability(date));
        }
        let near = bookings_near(&guard, date, &self.policy);
        let bookable = resolve_bookable_slots(date, &guard.weekly, &near, local_now, &self.policy);
        let buffer = self.policy.buffer_ms();
        if !bookable.contains(&time) {
            // Open on the weekly pattern but gone now: taken, or already passed.
            check_no_conflict(&guard, &span, buffer)?;
            return Err(EngineError::InvalidRange(date));
        }
        check_no_conflict(&guard, &span, buffer)?;

        let package_id = guard
            .usable_package_for(req.member_id)
            .ok_or(EngineError::NoCredits {
                member_id: req.member_id,
                coach_id: req.coach_id,
            })?
            .id;

        let booking = Booking {
            id: req.id,
            member_id: req.member_id,
            coach_id: req.coach_id,
            package_id: Some(package_id),
            scheduled_at: req.scheduled_at,
            duration_minutes: req.duration_minutes,
            status: BookingStatus::Scheduled,
            notes: None,
            created_at: now,
        };
        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        self.notify.publish(Notice::BookingConfirmed { booking: booking.clone() });
        Ok(booking)
    }

    /// Coach-side booking: any free span, no grid alignment, no credit check.
    pub async fn schedule_booking(&self, req: CoachBookingRequest) -> Result<Booking, EngineError> {
        let span = validate_booking_span(req.scheduled_at, req.duration_minutes)?;
        if let Some(n) = &req.notes
            && n.len() > MAX_NOTES_LEN {
                return Err(EngineError::LimitExceeded("notes too long"));
            }
        let cs = self
            .get_coach(&req.coach_id)
            .ok_or(EngineError::NotFound(req.coach_id))?;
        let mut guard = cs.write().await;
        if self.entity_to_coach.contains_key(&req.id) {
            return Err(EngineError::AlreadyExists(req.id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_COACH {
            return Err(EngineError::LimitExceeded("too many bookings on coach"));
        }
        let checked = check_no_conflict(&guard, &span, self.policy.buffer_ms());
        if let Err(e) = checked {
            metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => observability::error_label(&e))
                .increment(1);
            return Err(e);
        }

        let booking = Booking {
            id: req.id,
            member_id: req.member_id,
            coach_id: req.coach_id,
            package_id: None,
            scheduled_at: req.scheduled_at,
            duration_minutes: req.duration_minutes,
            status: BookingStatus::Scheduled,
            notes: req.notes,
            created_at: self.now_ms(),
        };
        let event = Event::BookingCreated { booking: booking.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);

        metrics::counter!(observability::BOOKINGS_TOTAL, "outcome" => "ok").increment(1);
        info!("booking {} scheduled by coach {}", booking.id, booking.coach_id);
        self.notify.publish(Notice::BookingConfirmed { booking: booking.clone() });
        Ok(booking)
    }

    /// Member cancels their own scheduled booking.
    pub async fn cancel_member_booking(
        &self,
        id: BookingId,
        member_id: MemberId,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_entity_write(&id).await?;
        // Someone else's booking looks exactly like a missing one.
        let booking = guard
            .booking(id)
            .filter(|b| b.member_id == member_id)
            .ok_or(EngineError::NotFound(id))?;
        if booking.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Cancelled,
            });
        }
        let cancelled = self
            .change_status(&mut guard, id, BookingStatus::Cancelled, None)
            .await?;
        drop(guard);

        info!("booking {id} cancelled by member {member_id}");
        self.notify.publish(Notice::BookingCancelled {
            booking: cancelled.clone(),
            by: Actor::Member,
        });
        Ok(cancelled)
    }

    /// Coach marks a booking completed, cancelled or no-show.
    ///
    /// Completing a session consumes one credit from the booking's package,
    /// or from the member's oldest usable package with this coach. Status and
    /// credit are one WAL record.
    pub async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let mut guard = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if !booking.status.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: booking.status,
                to: status,
            });
        }

        let consumed = if status == BookingStatus::Completed {
            booking
                .package_id
                .and_then(|pid| guard.package(pid))
                .filter(|p| p.is_usable())
                .or_else(|| guard.usable_package_for(booking.member_id))
                .map(|p| p.id)
        } else {
            None
        };

        let updated = self.change_status(&mut guard, id, status, consumed).await?;
        drop(guard);

        info!("booking {id} marked {status}");
        if status == BookingStatus::Cancelled {
            self.notify.publish(Notice::BookingCancelled {
                booking: updated.clone(),
                by: Actor::Coach,
            });
        }
        Ok(updated)
    }

    /// Remove a booking outright. Completed sessions are immutable.
    pub async fn delete_booking(&self, id: BookingId) -> Result<CoachId, EngineError> {
        let mut guard = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if booking.status == BookingStatus::Completed {
            return Err(EngineError::InvalidInput("completed bookings cannot be deleted"));
        }
        let coach_id = guard.id;
        let event = Event::BookingDeleted { id, coach_id };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("booking {id} deleted");
        Ok(coach_id)
    }

    async fn change_status(
        &self,
        cs: &mut CoachState,
        id: BookingId,
        status: BookingStatus,
        consumed_package: Option<PackageId>,
    ) -> Result<Booking, EngineError> {
        let event = Event::BookingStatusChanged {
            id,
            coach_id: cs.id,
            status,
            consumed_package,
        };
        self.persist_and_apply(cs, &event).await?;
        cs.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Mint an id and book. Convenience for callers that don't carry their own ids.
    pub async fn book_next(
        &self,
        member_id: MemberId,
        coach_id: CoachId,
        scheduled_at: Ms,
    ) -> Result<Booking, EngineError> {
        self.book_session(BookingRequest {
            id: Ulid::new(),
            member_id,
            coach_id,
            scheduled_at,
            duration_minutes: self.policy.session_minutes,
        })
        .await
    }
}
