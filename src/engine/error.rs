use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{ReservationStatus, RoomStatus};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error("room {room_id} is not available for those dates (held by reservation {reservation_id})")]
    Conflict { room_id: Ulid, reservation_id: Ulid },
    #[error("{0}")]
    State(#[from] StateError),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("already exists: {0}")]
    AlreadyExists(Ulid),
    #[error("WAL error: {0}")]
    WalError(String),
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; never retried.
    Validation,
    /// Room taken; retry only with different room or dates.
    Conflict,
    /// Illegal lifecycle transition.
    State,
    NotFound,
    /// Storage failure; state must be re-read before any retry.
    Persistence,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::AlreadyExists(_) => ErrorKind::Validation,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::State(_) => ErrorKind::State,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::WalError(_) => ErrorKind::Persistence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("check-out {check_out} must be after check-in {check_in}")]
    DateOrder {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },
    #[error("check-in {check_in} is in the past (today is {today})")]
    CheckInInPast { check_in: NaiveDate, today: NaiveDate },
    #[error("room holds at most {capacity} guests, {requested} requested")]
    CapacityExceeded { requested: u32, capacity: u32 },
    #[error("at least one adult is required")]
    NoAdults,
    #[error("room {0} is inactive")]
    RoomInactive(Ulid),
    #[error("room number {0} is already registered")]
    DuplicateRoomNumber(u32),
    #[error("room type capacity must be at least 1")]
    ZeroCapacity,
    #[error("base rate must not be negative: {0}")]
    NegativeRate(Decimal),
    #[error("season multiplier must not be negative: {0}")]
    NegativeMultiplier(Decimal),
    #[error("season ends {end} before it starts {start}")]
    SeasonRange { start: NaiveDate, end: NaiveDate },
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("cannot {action} a reservation that is {from}")]
    InvalidTransition {
        action: &'static str,
        from: ReservationStatus,
    },
    #[error("reservation {reservation_id} is for room {expected}, not {given}")]
    RoomMismatch {
        reservation_id: Ulid,
        expected: Ulid,
        given: Ulid,
    },
    #[error("room {room_id} is {status}, not available")]
    RoomNotAvailable { room_id: Ulid, status: RoomStatus },
    #[error("reservation {0} has no stay to check out")]
    NoStay(Ulid),
    #[error("reservation {0} is already checked out")]
    AlreadyCheckedOut(Ulid),
}
