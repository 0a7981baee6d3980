use chrono::{DateTime, Local, NaiveDate, Utc};
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{EngineError, ValidationError};

pub(crate) fn now() -> DateTime<Utc> {
    Utc::now()
}

/// The hotel's calendar date.
pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Date order, past-date and length checks shared by booking and amending.
pub(crate) fn validate_stay(
    check_in: NaiveDate,
    check_out: NaiveDate,
    today: NaiveDate,
) -> Result<DateSpan, ValidationError> {
    let span = DateSpan::try_new(check_in, check_out)
        .ok_or(ValidationError::DateOrder { check_in, check_out })?;
    if check_in < today {
        return Err(ValidationError::CheckInInPast { check_in, today });
    }
    if span.nights() > MAX_STAY_NIGHTS {
        return Err(ValidationError::LimitExceeded("stay too long"));
    }
    Ok(span)
}

pub(crate) fn validate_party(adults: u32, children: u32, capacity: u32) -> Result<(), ValidationError> {
    if adults == 0 {
        return Err(ValidationError::NoAdults);
    }
    let requested = adults.saturating_add(children);
    if requested > capacity {
        return Err(ValidationError::CapacityExceeded { requested, capacity });
    }
    Ok(())
}

pub(crate) fn validate_base_rate(rate: Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() {
        return Err(ValidationError::NegativeRate(rate));
    }
    if rate > Decimal::from(MAX_BASE_RATE) {
        return Err(ValidationError::LimitExceeded("base rate too high"));
    }
    Ok(())
}

pub(crate) fn validate_multiplier(multiplier: Decimal) -> Result<(), ValidationError> {
    if multiplier.is_sign_negative() {
        return Err(ValidationError::NegativeMultiplier(multiplier));
    }
    if multiplier > Decimal::from(MAX_MULTIPLIER) {
        return Err(ValidationError::LimitExceeded("season multiplier too high"));
    }
    Ok(())
}

pub(crate) fn validate_text(
    text: Option<&str>,
    max: usize,
    what: &'static str,
) -> Result<(), ValidationError> {
    match text {
        Some(t) if t.len() > max => Err(ValidationError::LimitExceeded(what)),
        _ => Ok(()),
    }
}

/// The availability predicate. Any confirmed or completed reservation on the
/// room whose nights intersect `span` blocks it, except `exclude` itself.
///
/// Callers evaluate this while holding the room's lock so the answer stays
/// true until their write commits.
pub(crate) fn check_no_conflict(
    rs: &RoomState,
    span: &DateSpan,
    exclude: Option<Ulid>,
) -> Result<(), EngineError> {
    for reservation in rs.overlapping(span) {
        if Some(reservation.id) == exclude || !reservation.status.holds_inventory() {
            continue;
        }
        return Err(EngineError::Conflict {
            room_id: rs.room.id,
            reservation_id: reservation.id,
        });
    }
    Ok(())
}

pub(crate) fn is_free(rs: &RoomState, span: &DateSpan, exclude: Option<Ulid>) -> bool {
    check_no_conflict(rs, span, exclude).is_ok()
}
