use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::{Booking, CoachId, MemberId, SessionPackage};

const CHANNEL_CAPACITY: usize = 256;

/// Who triggered a cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Member,
    Coach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Member(MemberId),
    Coach(CoachId),
}

/// Something a member or coach should be told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    BookingConfirmed { booking: Booking },
    BookingCancelled { booking: Booking, by: Actor },
    /// Sent the day before a scheduled session.
    SessionReminder { booking: Booking },
    /// A package is down to its last sessions.
    SessionsLow { package: SessionPackage },
}

impl Notice {
    pub fn coach_id(&self) -> CoachId {
        match self {
            Notice::BookingConfirmed { booking }
            | Notice::BookingCancelled { booking, .. }
            | Notice::SessionReminder { booking } => booking.coach_id,
            Notice::SessionsLow { package } => package.coach_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notice::BookingConfirmed { .. } => "booking_confirmed",
            Notice::BookingCancelled { .. } => "booking_cancelled",
            Notice::SessionReminder { .. } => "session_reminder",
            Notice::SessionsLow { .. } => "sessions_low",
        }
    }

    /// Confirmations and cancellations go to both sides; reminders only to the member.
    pub fn recipients(&self) -> Vec<Recipient> {
        match self {
            Notice::BookingConfirmed { booking } | Notice::BookingCancelled { booking, .. } => vec![
                Recipient::Member(booking.member_id),
                Recipient::Coach(booking.coach_id),
            ],
            Notice::SessionReminder { booking } => vec![Recipient::Member(booking.member_id)],
            Notice::SessionsLow { package } => vec![Recipient::Member(package.member_id)],
        }
    }
}

/// Broadcast hub: one channel per coach plus one carrying everything.
pub struct NotifyHub {
    channels: DashMap<CoachId, broadcast::Sender<Notice>>,
    all: broadcast::Sender<Notice>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to one coach's notices. Creates the channel if needed.
    pub fn subscribe(&self, coach_id: CoachId) -> broadcast::Receiver<Notice> {
        let sender = self
            .channels
            .entry(coach_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Subscribe to every notice in the tenant.
    pub fn subscribe_all(&self) -> broadcast::Receiver<Notice> {
        self.all.subscribe()
    }

    /// Fire and forget. No-op for channels nobody listens on.
    pub fn publish(&self, notice: Notice) {
        if let Some(sender) = self.channels.get(&notice.coach_id()) {
            let _ = sender.send(notice.clone());
        }
        let _ = self.all.send(notice);
    }
}
