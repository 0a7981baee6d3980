//! Reservation state machine.
//!
//! ```text
//! confirmed ──check_in──▶ completed ──check_out──▶ completed (stay closed)
//!     │
//!     ├──cancel──▶ cancelled
//!     └──mark_no_show──▶ no-show
//! ```
//!
//! Every entry point validates against the locked room state and commits one
//! WAL event, so the reservation row, the room status, the stay and the
//! history line change together or not at all.

use chrono::NaiveDate;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, now, today, validate_party, validate_stay, validate_text};
use super::{Engine, EngineError, StateError, ValidationError, state_error};

/// Input to [`Engine::create_reservation`].
#[derive(Debug, Clone)]
pub struct NewReservation {
    pub guest_id: Ulid,
    pub room_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub adults: u32,
    pub children: u32,
    pub notes: Option<String>,
    /// Staff member making the booking.
    pub actor: Ulid,
}

/// Fields of a confirmed reservation that may be edited. `None` keeps the
/// current value.
#[derive(Debug, Clone, Default)]
pub struct ReservationChanges {
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub adults: Option<u32>,
    pub children: Option<u32>,
    pub notes: Option<String>,
}

fn history(
    reservation_id: Ulid,
    previous: Option<ReservationStatus>,
    new: ReservationStatus,
    actor: Ulid,
    reason: Option<String>,
) -> HistoryEntry {
    HistoryEntry {
        reservation_id,
        previous,
        new,
        actor,
        reason,
        at: now(),
    }
}

fn count_transition(transition: &'static str) {
    metrics::counter!(crate::observability::LIFECYCLE_TRANSITIONS_TOTAL, "transition" => transition)
        .increment(1);
}

fn conflict(err: EngineError) -> EngineError {
    if let EngineError::Conflict { room_id, reservation_id } = &err {
        debug!("room {room_id} unavailable, held by reservation {reservation_id}");
        metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
    }
    err
}

impl Engine {
    /// Book a room. The availability check and the insert happen under the
    /// room's write lock, so of two overlapping requests for the same room
    /// exactly one commits; the other gets [`EngineError::Conflict`].
    pub async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        let span = validate_stay(req.check_in, req.check_out, today())?;
        validate_text(req.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
        let seasons = self.season_snapshot().await;

        let _commit = self.commit_gate.read().await;
        let rs = self
            .get_room(&req.room_id)
            .ok_or(EngineError::NotFound(req.room_id))?;
        let mut guard = rs.write().await;
        if !guard.room.active {
            return Err(ValidationError::RoomInactive(req.room_id).into());
        }
        let capacity = self.room_type_capacity(&guard.room.room_type_id)?;
        validate_party(req.adults, req.children, capacity)?;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(ValidationError::LimitExceeded("too many reservations on room").into());
        }

        check_no_conflict(&guard, &span, None).map_err(conflict)?;

        let (_, total_rate) = seasons
            .quote(guard.room.base_rate, &span)
            .ok_or(ValidationError::LimitExceeded("stay price out of range"))?;
        let id = Ulid::new();
        let reservation = Reservation {
            id,
            code: self.next_code(),
            guest_id: req.guest_id,
            room_id: req.room_id,
            span,
            adults: req.adults,
            children: req.children,
            total_rate,
            notes: req.notes,
            status: ReservationStatus::Confirmed,
            cancellation: None,
            created_by: req.actor,
            created_at: now(),
        };
        let entry = history(
            id,
            None,
            ReservationStatus::Confirmed,
            req.actor,
            Some("reservation created".into()),
        );
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
            entry,
        };
        self.persist_and_apply(req.room_id, &mut guard, &event).await?;

        metrics::counter!(crate::observability::RESERVATIONS_CREATED_TOTAL).increment(1);
        info!(
            code = %reservation.code,
            room = guard.room.number,
            actor = %req.actor,
            "reservation created for {span}"
        );
        Ok(reservation)
    }

    /// Change dates, party size or notes of a confirmed reservation. The
    /// new dates are checked against every other reservation on the room.
    pub async fn amend_reservation(
        &self,
        reservation_id: Ulid,
        changes: ReservationChanges,
        actor: Ulid,
    ) -> Result<Reservation, EngineError> {
        validate_text(changes.notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;
        let seasons = self.season_snapshot().await;

        let _commit = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let current = guard
            .reservation(reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound(reservation_id))?;
        if current.status != ReservationStatus::Confirmed {
            return Err(state_error(StateError::InvalidTransition {
                action: "amend",
                from: current.status,
            }));
        }

        let check_in = changes.check_in.unwrap_or(current.span.start);
        let check_out = changes.check_out.unwrap_or(current.span.end);
        let span = validate_stay(check_in, check_out, today())?;
        let adults = changes.adults.unwrap_or(current.adults);
        let children = changes.children.unwrap_or(current.children);
        let capacity = self.room_type_capacity(&guard.room.room_type_id)?;
        validate_party(adults, children, capacity)?;

        check_no_conflict(&guard, &span, Some(reservation_id)).map_err(conflict)?;

        let (_, total_rate) = seasons
            .quote(guard.room.base_rate, &span)
            .ok_or(ValidationError::LimitExceeded("stay price out of range"))?;
        let notes = changes.notes.or(current.notes);
        let event = Event::ReservationAmended {
            room_id,
            reservation_id,
            span,
            adults,
            children,
            notes,
            total_rate,
            entry: history(
                reservation_id,
                Some(ReservationStatus::Confirmed),
                ReservationStatus::Confirmed,
                actor,
                Some("amended".into()),
            ),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        count_transition("amend");
        info!(code = %current.code, actor = %actor, "reservation amended to {span}");

        guard
            .reservation(reservation_id)
            .cloned()
            .ok_or(EngineError::NotFound(reservation_id))
    }

    /// Hand the guest their key. The reservation becomes `completed` and the
    /// room `occupied`; departure is later recorded on the returned stay.
    pub async fn check_in(
        &self,
        reservation_id: Ulid,
        room_id: Ulid,
        actor: Ulid,
    ) -> Result<Stay, EngineError> {
        let _commit = self.commit_gate.read().await;
        let (owner, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        if owner != room_id {
            return Err(state_error(StateError::RoomMismatch {
                reservation_id,
                expected: owner,
                given: room_id,
            }));
        }
        let status = guard
            .reservation(reservation_id)
            .map(|r| r.status)
            .ok_or(EngineError::NotFound(reservation_id))?;
        if status != ReservationStatus::Confirmed {
            return Err(state_error(StateError::InvalidTransition {
                action: "check in",
                from: status,
            }));
        }
        if guard.room.status != RoomStatus::Available {
            return Err(state_error(StateError::RoomNotAvailable {
                room_id,
                status: guard.room.status,
            }));
        }

        let stay = Stay {
            id: Ulid::new(),
            reservation_id,
            room_id,
            checked_in_at: now(),
            checked_out_at: None,
            key_handed_over: true,
            key_returned: false,
            checked_in_by: actor,
            checked_out_by: None,
            checkout_notes: None,
        };
        let event = Event::CheckedIn {
            room_id,
            stay: stay.clone(),
            entry: history(
                reservation_id,
                Some(ReservationStatus::Confirmed),
                ReservationStatus::Completed,
                actor,
                Some("check-in".into()),
            ),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        count_transition("check_in");
        info!(room = guard.room.number, actor = %actor, "check-in for reservation {reservation_id}");
        Ok(stay)
    }

    /// Close the open stay and release the room.
    pub async fn check_out(
        &self,
        reservation_id: Ulid,
        room_id: Ulid,
        actor: Ulid,
        notes: Option<String>,
    ) -> Result<(), EngineError> {
        validate_text(notes.as_deref(), MAX_NOTES_LEN, "notes too long")?;

        let _commit = self.commit_gate.read().await;
        let (owner, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        if owner != room_id {
            return Err(state_error(StateError::RoomMismatch {
                reservation_id,
                expected: owner,
                given: room_id,
            }));
        }
        match guard.stay_for(reservation_id) {
            None => return Err(state_error(StateError::NoStay(reservation_id))),
            Some(stay) if !stay.is_open() => {
                return Err(state_error(StateError::AlreadyCheckedOut(reservation_id)));
            }
            Some(_) => {}
        }

        let event = Event::CheckedOut {
            room_id,
            reservation_id,
            at: now(),
            actor,
            notes,
            entry: history(
                reservation_id,
                Some(ReservationStatus::Completed),
                ReservationStatus::Completed,
                actor,
                Some("check-out".into()),
            ),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        count_transition("check_out");
        info!(room = guard.room.number, actor = %actor, "check-out for reservation {reservation_id}");
        Ok(())
    }

    /// Cancel a confirmed reservation, freeing its nights. `refund` only
    /// leaves an audit record; money movement happens elsewhere.
    pub async fn cancel_reservation(
        &self,
        reservation_id: Ulid,
        reason: impl Into<String>,
        actor: Ulid,
        refund: bool,
    ) -> Result<(), EngineError> {
        let reason = reason.into();
        validate_text(Some(&reason), MAX_REASON_LEN, "reason too long")?;

        let _commit = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let (status, code, total) = guard
            .reservation(reservation_id)
            .map(|r| (r.status, r.code.clone(), r.total_rate))
            .ok_or(EngineError::NotFound(reservation_id))?;
        if status != ReservationStatus::Confirmed {
            return Err(state_error(StateError::InvalidTransition {
                action: "cancel",
                from: status,
            }));
        }

        let cancellation = Cancellation {
            reason: reason.clone(),
            at: now(),
            refund_requested: refund,
        };
        let event = Event::ReservationCancelled {
            room_id,
            reservation_id,
            cancellation,
            entry: history(
                reservation_id,
                Some(status),
                ReservationStatus::Cancelled,
                actor,
                Some(reason.clone()),
            ),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        count_transition("cancel");
        info!(code = %code, actor = %actor, reason = %reason, "reservation cancelled");

        if refund {
            metrics::counter!(crate::observability::REFUNDS_REQUESTED_TOTAL).increment(1);
            info!(
                target: "audit",
                action = "REFUND",
                reservation = %reservation_id,
                code = %code,
                amount = %total,
                actor = %actor,
                reason = %reason,
                "refund requested on cancellation"
            );
        }
        Ok(())
    }

    /// Record that the guest never arrived. Terminal; frees the nights.
    pub async fn mark_no_show(
        &self,
        reservation_id: Ulid,
        actor: Ulid,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        validate_text(reason.as_deref(), MAX_REASON_LEN, "reason too long")?;

        let _commit = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let status = guard
            .reservation(reservation_id)
            .map(|r| r.status)
            .ok_or(EngineError::NotFound(reservation_id))?;
        if status != ReservationStatus::Confirmed {
            return Err(state_error(StateError::InvalidTransition {
                action: "mark as no-show",
                from: status,
            }));
        }

        let event = Event::MarkedNoShow {
            room_id,
            reservation_id,
            entry: history(
                reservation_id,
                Some(status),
                ReservationStatus::NoShow,
                actor,
                reason,
            ),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await?;
        count_transition("no_show");
        info!(actor = %actor, "reservation {reservation_id} marked no-show");
        Ok(())
    }

    /// Append a note to the reservation's trail without changing its state.
    pub async fn annotate_reservation(
        &self,
        reservation_id: Ulid,
        actor: Ulid,
        note: impl Into<String>,
    ) -> Result<(), EngineError> {
        let note = note.into();
        validate_text(Some(&note), MAX_NOTES_LEN, "notes too long")?;

        let _commit = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_reservation_write(&reservation_id).await?;
        let status = guard
            .reservation(reservation_id)
            .map(|r| r.status)
            .ok_or(EngineError::NotFound(reservation_id))?;

        let event = Event::ReservationAnnotated {
            room_id,
            entry: history(reservation_id, Some(status), status, actor, Some(note)),
        };
        self.persist_and_apply(room_id, &mut guard, &event).await
    }
}
