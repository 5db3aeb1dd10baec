use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{BookingId, BookingStatus, CoachId, MemberId};

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The coach has no open window covering the requested slot.
    NoAvailability(NaiveDate),
    /// The slot was taken by another booking. Retryable with a different time.
    SlotConflict(BookingId),
    /// Date is in the past or beyond the booking horizon.
    InvalidRange(NaiveDate),
    NoCredits {
        member_id: MemberId,
        coach_id: CoachId,
    },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    /// True when the caller should offer another slot instead of failing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SlotConflict(_))
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::NoAvailability(date) => {
                write!(f, "no availability on {date}")
            }
            EngineError::SlotConflict(id) => write!(
                f,
                "this time slot is no longer available (taken by booking {id}); please choose another time"
            ),
            EngineError::InvalidRange(date) => {
                write!(f, "date {date} is outside the booking window")
            }
            EngineError::NoCredits { member_id, coach_id } => write!(
                f,
                "member {member_id} has no active session package with coach {coach_id}"
            ),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move booking from {from} to {to}")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
