use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only absolute time type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

pub type CoachId = Ulid;
pub type MemberId = Ulid;
pub type BookingId = Ulid;
pub type PackageId = Ulid;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Same start, end pushed out by `extra` (buffer after a session).
    pub fn extended(&self, extra: Ms) -> Span {
        Span::new(self.start, self.end + extra.max(0))
    }
}

// ── Wall-clock conversion ────────────────────────────────────────

/// Absolute instant of `date` + `time` on a wall clock at `offset`.
pub fn local_instant(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Ms {
    let wall = date.and_time(time).and_utc().timestamp_millis();
    wall - Ms::from(offset.local_minus_utc()) * 1000
}

/// Wall-clock reading of `ms` at `offset`. `None` if `ms` is out of chrono's range.
pub fn local_datetime(ms: Ms, offset: FixedOffset) -> Option<NaiveDateTime> {
    let utc = DateTime::from_timestamp_millis(ms)?.naive_utc();
    utc.checked_add_signed(TimeDelta::seconds(i64::from(offset.local_minus_utc())))
}

/// Day-of-week index with 0 = Sunday.
pub fn day_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

// ── Schedule ─────────────────────────────────────────────────────

/// A coach's recurring window for one day of the week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyAvailability {
    pub coach_id: CoachId,
    /// 0 = Sunday … 6 = Saturday.
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, BookingStatus::Scheduled)
    }

    /// `scheduled -> {completed, cancelled, no_show}`; nothing leaves a terminal state.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        !self.is_terminal() && next != BookingStatus::Scheduled
    }

    /// Everything except a cancellation keeps its time slot occupied.
    pub fn blocks_slot(self) -> bool {
        self != BookingStatus::Cancelled
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::NoShow => "no_show",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub member_id: MemberId,
    pub coach_id: CoachId,
    /// Package the session is drawn from; coach-created bookings may have none.
    pub package_id: Option<PackageId>,
    pub scheduled_at: Ms,
    pub duration_minutes: u32,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: Ms,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(
            self.scheduled_at,
            self.scheduled_at + Ms::from(self.duration_minutes) * MINUTE_MS,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Active,
    Completed,
    Expired,
}

/// Prepaid personal-training sessions of one member with one coach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPackage {
    pub id: PackageId,
    pub member_id: MemberId,
    pub coach_id: CoachId,
    pub total_sessions: u32,
    pub remaining_sessions: u32,
    pub status: PackageStatus,
    pub purchased_at: Ms,
}

impl SessionPackage {
    pub fn is_usable(&self) -> bool {
        self.status == PackageStatus::Active && self.remaining_sessions > 0
    }

    /// Use up one session; the package completes when it runs out.
    pub fn consume_one(&mut self) {
        self.remaining_sessions = self.remaining_sessions.saturating_sub(1);
        if self.remaining_sessions == 0 {
            self.status = PackageStatus::Completed;
        }
    }
}

// ── Per-coach state ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CoachState {
    pub id: CoachId,
    pub name: Option<String>,
    /// At most one row per day, sorted by `day_of_week`.
    pub weekly: Vec<WeeklyAvailability>,
    /// All bookings regardless of status, sorted by `scheduled_at`.
    pub bookings: Vec<Booking>,
    pub packages: Vec<SessionPackage>,
}

impl CoachState {
    pub fn new(id: CoachId, name: Option<String>) -> Self {
        Self {
            id,
            name,
            weekly: Vec::new(),
            bookings: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// Insert or replace the row for `row.day_of_week`.
    pub fn upsert_availability(&mut self, row: WeeklyAvailability) {
        match self
            .weekly
            .binary_search_by_key(&row.day_of_week, |r| r.day_of_week)
        {
            Ok(pos) => self.weekly[pos] = row,
            Err(pos) => self.weekly.insert(pos, row),
        }
    }

    pub fn availability_for(&self, day_of_week: u8) -> Option<&WeeklyAvailability> {
        self.weekly.iter().find(|r| r.day_of_week == day_of_week)
    }

    /// Insert booking maintaining sort order by `scheduled_at`.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.scheduled_at <= booking.scheduled_at);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: BookingId) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: BookingId) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: BookingId) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings (any status) whose span overlaps `query`.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.scheduled_at < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span().end > query.start)
    }

    pub fn package(&self, id: PackageId) -> Option<&SessionPackage> {
        self.packages.iter().find(|p| p.id == id)
    }

    pub fn package_mut(&mut self, id: PackageId) -> Option<&mut SessionPackage> {
        self.packages.iter_mut().find(|p| p.id == id)
    }

    /// Oldest usable package of `member_id` with this coach.
    pub fn usable_package_for(&self, member_id: MemberId) -> Option<&SessionPackage> {
        self.packages
            .iter()
            .filter(|p| p.member_id == member_id && p.is_usable())
            .min_by_key(|p| p.purchased_at)
    }
}

/// The WAL record format. Every state change is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CoachRegistered {
        id: CoachId,
        name: Option<String>,
    },
    AvailabilitySet {
        row: WeeklyAvailability,
    },
    PackageGranted {
        package: SessionPackage,
    },
    PackageExpired {
        id: PackageId,
        coach_id: CoachId,
    },
    BookingCreated {
        booking: Booking,
    },
    /// Status change plus the credit it consumes, committed as one record.
    BookingStatusChanged {
        id: BookingId,
        coach_id: CoachId,
        status: BookingStatus,
        consumed_package: Option<PackageId>,
    },
    BookingDeleted {
        id: BookingId,
        coach_id: CoachId,
    },
}

impl Event {
    pub fn coach_id(&self) -> CoachId {
        match self {
            Event::CoachRegistered { id, .. } => *id,
            Event::AvailabilitySet { row } => row.coach_id,
            Event::PackageGranted { package } => package.coach_id,
            Event::BookingCreated { booking } => booking.coach_id,
            Event::PackageExpired { coach_id, .. }
            | Event::BookingStatusChanged { coach_id, .. }
            | Event::BookingDeleted { coach_id, .. } => *coach_id,
        }
    }
}
