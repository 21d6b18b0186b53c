use std::fmt;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::DomainError;
use crate::reservation::Reservation;

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Ulid);

        impl $name {
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Ulid> for $name {
            fn from(id: Ulid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

ulid_id!(
    /// A restaurant business. Scopes everything else.
    TenantId
);
ulid_id!(
    /// A physical location of a tenant.
    BranchId
);
ulid_id!(TableId);
ulid_id!(ReservationId);

/// Weekly-recurring half-open window `[start, end)` on one day of the week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSlot")]
pub struct ScheduleSlot {
    day: Weekday,
    start: NaiveTime,
    end: NaiveTime,
}

/// Wire shape of [`ScheduleSlot`]; decoding goes through [`ScheduleSlot::new`].
#[derive(Deserialize)]
struct RawSlot {
    day: Weekday,
    start: NaiveTime,
    end: NaiveTime,
}

impl TryFrom<RawSlot> for ScheduleSlot {
    type Error = DomainError;

    fn try_from(raw: RawSlot) -> Result<Self, Self::Error> {
        Self::new(raw.day, raw.start, raw.end)
    }
}

impl ScheduleSlot {
    pub fn new(day: Weekday, start: NaiveTime, end: NaiveTime) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::InvalidSlot { start, end });
        }
        Ok(Self { day, start, end })
    }

    pub fn day(&self) -> Weekday {
        self.day
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Touching boundaries do not overlap.
    pub fn overlaps(&self, other: &ScheduleSlot) -> bool {
        self.day == other.day && self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &ScheduleSlot) -> bool {
        self.day == other.day && self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for ScheduleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.day,
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// A seating resource owned by a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub label: String,
    pub capacity: u32,
    pub is_outdoor: bool,
    pub is_out_of_service: bool,
}

impl Table {
    pub fn new(id: TableId, label: impl Into<String>, capacity: u32, is_outdoor: bool) -> Self {
        Self {
            id,
            label: label.into(),
            capacity,
            is_outdoor,
            is_out_of_service: false,
        }
    }

    pub fn seats(&self, party_size: u32) -> bool {
        !self.is_out_of_service && self.capacity >= party_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    CheckedIn,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    /// Pending, Confirmed and CheckedIn reservations occupy their table.
    pub fn is_blocking(self) -> bool {
        matches!(self, Self::Pending | Self::Confirmed | Self::CheckedIn)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::CheckedIn | Self::Cancelled | Self::NoShow)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::CheckedIn => "checked-in",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no-show",
        };
        f.write_str(s)
    }
}

/// One entry of a reservation's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: ReservationStatus,
    pub changed_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// The part of an existing reservation the allocation policy needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedSlot {
    pub table_id: TableId,
    pub slot: ScheduleSlot,
    pub status: ReservationStatus,
}

impl BookedSlot {
    /// True if this reservation keeps `table_id` occupied during `slot`.
    pub fn blocks(&self, table_id: TableId, slot: &ScheduleSlot) -> bool {
        self.table_id == table_id && self.status.is_blocking() && self.slot.overlaps(slot)
    }
}

impl From<&Reservation> for BookedSlot {
    fn from(r: &Reservation) -> Self {
        Self {
            table_id: r.table_id(),
            slot: r.slot(),
            status: r.status(),
        }
    }
}

/// Outcome of a table search. Not finding a table is an expected result, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationResult {
    Success { table_id: TableId },
    Failure { reason: String },
}

impl AllocationResult {
    pub fn success(table_id: TableId) -> Self {
        Self::Success { table_id }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn table_id(&self) -> Option<TableId> {
        match self {
            Self::Success { table_id } => Some(*table_id),
            Self::Failure { .. } => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason } => Some(reason),
        }
    }
}

// ── Lifecycle events ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationEventKind {
    Created { slot: ScheduleSlot, party_size: u32 },
    Confirmed,
    CheckedIn,
    Cancelled { reason: String },
    NoShowRecorded,
}

/// Raised by every successful reservation transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationEvent {
    pub reservation_id: ReservationId,
    pub tenant_id: TenantId,
    pub branch_id: BranchId,
    pub table_id: TableId,
    pub occurred_at: DateTime<Utc>,
    pub kind: ReservationEventKind,
}

impl ReservationEvent {
    pub fn name(&self) -> &'static str {
        match self.kind {
            ReservationEventKind::Created { .. } => "ReservationCreated",
            ReservationEventKind::Confirmed => "ReservationConfirmed",
            ReservationEventKind::CheckedIn => "ReservationCheckedIn",
            ReservationEventKind::Cancelled { .. } => "ReservationCancelled",
            ReservationEventKind::NoShowRecorded => "ReservationNoShowRecorded",
        }
    }
}

// ── WAL records ──────────────────────────────────────────────────

/// The WAL record format. Replaying every record in order rebuilds a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    BranchCreated {
        id: BranchId,
        name: Option<String>,
    },
    OpeningHoursSet {
        branch_id: BranchId,
        hours: Vec<ScheduleSlot>,
    },
    TableUpserted {
        branch_id: BranchId,
        table: Table,
    },
    TableRemoved {
        branch_id: BranchId,
        table_id: TableId,
    },
    ReservationSaved {
        reservation: Reservation,
    },
}

impl Record {
    pub fn branch_id(&self) -> BranchId {
        match self {
            Record::BranchCreated { id, .. } => *id,
            Record::OpeningHoursSet { branch_id, .. }
            | Record::TableUpserted { branch_id, .. }
            | Record::TableRemoved { branch_id, .. } => *branch_id,
            Record::ReservationSaved { reservation } => reservation.branch_id(),
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchInfo {
    pub id: BranchId,
    pub name: Option<String>,
    pub opening_hours: Vec<ScheduleSlot>,
    pub table_count: usize,
    pub reservation_count: usize,
}
