use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open night range `[start, end)`: the guest occupies the room on every
/// night from `start` up to, but not including, `end` (the checkout day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        debug_assert!(start < end, "DateSpan start must be before end");
        Self { start, end }
    }

    /// `None` unless `start < end`.
    pub fn try_new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    pub fn overlaps(&self, other: &DateSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_night(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Every occupied night, checkout day excluded.
    pub fn nights_iter(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d < end)
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomStatus {
    Available,
    Occupied,
    Maintenance,
    Reserved,
    Cleaning,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Occupied => "occupied",
            RoomStatus::Maintenance => "maintenance",
            RoomStatus::Reserved => "reserved",
            RoomStatus::Cleaning => "cleaning",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reservation lifecycle states.
///
/// `Completed` is entered at check-in, not at departure; whether the guest is
/// still in the house is answered by the reservation's [`Stay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Completed => "completed",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::NoShow => "no-show",
        }
    }

    /// Whether a reservation in this state keeps its nights booked.
    pub fn holds_inventory(&self) -> bool {
        matches!(self, ReservationStatus::Confirmed | ReservationStatus::Completed)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomType {
    pub id: Ulid,
    pub name: String,
    /// Maximum number of guests (adults + children).
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub number: u32,
    pub floor: i32,
    pub room_type_id: Ulid,
    /// Operational display state. Availability is never read from here.
    pub status: RoomStatus,
    pub base_rate: Decimal,
    /// Soft-delete flag; rooms are never removed.
    pub active: bool,
}

/// Date-scoped price multiplier, both ends inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRule {
    pub id: Ulid,
    pub name: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub multiplier: Decimal,
}

impl SeasonRule {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub at: DateTime<Utc>,
    pub refund_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    /// Human-readable code handed to the guest.
    pub code: String,
    pub guest_id: Ulid,
    pub room_id: Ulid,
    pub span: DateSpan,
    pub adults: u32,
    pub children: u32,
    pub total_rate: Decimal,
    pub notes: Option<String>,
    pub status: ReservationStatus,
    pub cancellation: Option<Cancellation>,
    pub created_by: Ulid,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn check_in(&self) -> NaiveDate {
        self.span.start
    }

    pub fn check_out(&self) -> NaiveDate {
        self.span.end
    }

    pub fn guests(&self) -> u32 {
        self.adults + self.children
    }
}

/// Physical occupancy, opened at check-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stay {
    pub id: Ulid,
    pub reservation_id: Ulid,
    pub room_id: Ulid,
    pub checked_in_at: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub key_handed_over: bool,
    pub key_returned: bool,
    pub checked_in_by: Ulid,
    pub checked_out_by: Option<Ulid>,
    pub checkout_notes: Option<String>,
}

impl Stay {
    pub fn is_open(&self) -> bool {
        self.checked_out_at.is_none()
    }
}

/// One line of the append-only transition trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub reservation_id: Ulid,
    /// `None` for the creation entry.
    pub previous: Option<ReservationStatus>,
    pub new: ReservationStatus,
    pub actor: Ulid,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// Everything the engine knows about one room. Guarded by a per-room lock.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    /// Sorted by `span.start`.
    pub reservations: Vec<Reservation>,
    pub stays: Vec<Stay>,
    /// Commit order.
    pub history: Vec<HistoryEntry>,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            reservations: Vec::new(),
            stays: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Insert maintaining sort order by check-in.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .partition_point(|r| r.span.start <= reservation.span.start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations (any status) whose nights intersect `query`.
    /// Binary search skips everything checking in on or after `query.end`.
    pub fn overlapping(&self, query: &DateSpan) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        let start = query.start;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > start)
    }

    pub fn stay_for(&self, reservation_id: Ulid) -> Option<&Stay> {
        self.stays.iter().find(|s| s.reservation_id == reservation_id)
    }

    pub fn stay_for_mut(&mut self, reservation_id: Ulid) -> Option<&mut Stay> {
        self.stays
            .iter_mut()
            .find(|s| s.reservation_id == reservation_id)
    }

    pub fn history_for(&self, reservation_id: Ulid) -> impl Iterator<Item = &HistoryEntry> {
        self.history
            .iter()
            .filter(move |h| h.reservation_id == reservation_id)
    }
}

/// WAL record. One event per committed operation, so every multi-row change
/// (reservation + room status + stay + history) is applied all-or-nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomTypeRegistered {
        room_type: RoomType,
    },
    RoomRegistered {
        room: Room,
    },
    RoomUpdated {
        id: Ulid,
        base_rate: Decimal,
        active: bool,
    },
    SeasonRuleAdded {
        rule: SeasonRule,
    },
    SeasonRuleRemoved {
        id: Ulid,
    },
    ReservationCreated {
        reservation: Reservation,
        entry: HistoryEntry,
    },
    ReservationAmended {
        room_id: Ulid,
        reservation_id: Ulid,
        span: DateSpan,
        adults: u32,
        children: u32,
        notes: Option<String>,
        total_rate: Decimal,
        entry: HistoryEntry,
    },
    CheckedIn {
        room_id: Ulid,
        stay: Stay,
        entry: HistoryEntry,
    },
    CheckedOut {
        room_id: Ulid,
        reservation_id: Ulid,
        at: DateTime<Utc>,
        actor: Ulid,
        notes: Option<String>,
        entry: HistoryEntry,
    },
    ReservationCancelled {
        room_id: Ulid,
        reservation_id: Ulid,
        cancellation: Cancellation,
        entry: HistoryEntry,
    },
    MarkedNoShow {
        room_id: Ulid,
        reservation_id: Ulid,
        entry: HistoryEntry,
    },
    ReservationAnnotated {
        room_id: Ulid,
        entry: HistoryEntry,
    },
    /// Compaction snapshot of a reservation with its stay and full trail.
    ReservationRestored {
        reservation: Reservation,
        stay: Option<Stay>,
        history: Vec<HistoryEntry>,
    },
}

impl Event {
    /// The room whose state this event mutates, if any.
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Event::RoomRegistered { room } => Some(room.id),
            Event::RoomUpdated { id, .. } => Some(*id),
            Event::ReservationCreated { reservation, .. }
            | Event::ReservationRestored { reservation, .. } => Some(reservation.room_id),
            Event::ReservationAmended { room_id, .. }
            | Event::CheckedIn { room_id, .. }
            | Event::CheckedOut { room_id, .. }
            | Event::ReservationCancelled { room_id, .. }
            | Event::MarkedNoShow { room_id, .. }
            | Event::ReservationAnnotated { room_id, .. } => Some(*room_id),
            Event::RoomTypeRegistered { .. }
            | Event::SeasonRuleAdded { .. }
            | Event::SeasonRuleRemoved { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

/// A room joined with its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub number: u32,
    pub floor: i32,
    pub room_type_id: Ulid,
    pub room_type_name: String,
    pub capacity: u32,
    pub status: RoomStatus,
    pub base_rate: Decimal,
    pub active: bool,
}

impl RoomInfo {
    pub fn new(room: &Room, room_type: &RoomType) -> Self {
        Self {
            id: room.id,
            number: room.number,
            floor: room.floor,
            room_type_id: room.room_type_id,
            room_type_name: room_type.name.clone(),
            capacity: room_type.capacity,
            status: room.status,
            base_rate: room.base_rate,
            active: room.active,
        }
    }
}

/// A free room priced for the requested stay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomQuote {
    pub room: RoomInfo,
    pub rate_per_night: Decimal,
    pub total_for_stay: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightlyRate {
    pub date: NaiveDate,
    pub multiplier: Decimal,
    pub rate: Decimal,
}
