mod conflict;
mod error;
mod inventory;
mod lifecycle;
mod mutations;
mod queries;

pub use error::{EngineError, ErrorKind, StateError, ValidationError};
pub use lifecycle::{NewReservation, ReservationChanges};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::pricing::SeasonTable;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Owns the WAL. Appends that queue up while one batch is being written are
/// drained into the next batch and share a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after a failed append so half-written bytes never leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// Reverse lookups kept beside the per-room state.
#[derive(Default)]
pub(super) struct ReservationIndex {
    /// reservation id → room id
    pub(super) rooms: DashMap<Ulid, Ulid>,
    /// reservation code → reservation id
    pub(super) codes: DashMap<String, Ulid>,
}

/// The availability, pricing and reservation lifecycle engine for one
/// property.
///
/// Each room's reservations, stays and history sit behind that room's own
/// lock; every write holds it from validation through WAL commit.
pub struct Engine {
    pub(super) rooms: DashMap<Ulid, SharedRoomState>,
    pub(super) room_types: DashMap<Ulid, RoomType>,
    /// room number → room id
    pub(super) room_numbers: DashMap<u32, Ulid>,
    pub(super) seasons: RwLock<SeasonTable>,
    pub(super) index: ReservationIndex,
    pub(super) code_seq: AtomicU64,
    /// Writers share it; compaction takes it exclusively so no commit can
    /// land between the snapshot and the log swap.
    pub(super) commit_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a room-scoped event (caller holds the room's write lock).
fn apply_to_room(rs: &mut RoomState, event: &Event, index: &ReservationIndex) {
    match event {
        Event::RoomUpdated { base_rate, active, .. } => {
            rs.room.base_rate = *base_rate;
            rs.room.active = *active;
        }
        Event::ReservationCreated { reservation, entry } => {
            index.rooms.insert(reservation.id, reservation.room_id);
            index.codes.insert(reservation.code.clone(), reservation.id);
            rs.insert_reservation(reservation.clone());
            rs.history.push(entry.clone());
        }
        Event::ReservationRestored {
            reservation,
            stay,
            history,
        } => {
            index.rooms.insert(reservation.id, reservation.room_id);
            index.codes.insert(reservation.code.clone(), reservation.id);
            rs.insert_reservation(reservation.clone());
            if let Some(stay) = stay {
                rs.stays.push(stay.clone());
            }
            rs.history.extend(history.iter().cloned());
        }
        Event::ReservationAmended {
            reservation_id,
            span,
            adults,
            children,
            notes,
            total_rate,
            entry,
            ..
        } => {
            if let Some(mut reservation) = rs.remove_reservation(*reservation_id) {
                reservation.span = *span;
                reservation.adults = *adults;
                reservation.children = *children;
                reservation.notes = notes.clone();
                reservation.total_rate = *total_rate;
                rs.insert_reservation(reservation);
            }
            rs.history.push(entry.clone());
        }
        Event::CheckedIn { stay, entry, .. } => {
            if let Some(reservation) = rs.reservation_mut(stay.reservation_id) {
                reservation.status = ReservationStatus::Completed;
            }
            rs.room.status = RoomStatus::Occupied;
            rs.stays.push(stay.clone());
            rs.history.push(entry.clone());
        }
        Event::CheckedOut {
            reservation_id,
            at,
            actor,
            notes,
            entry,
            ..
        } => {
            if let Some(stay) = rs.stay_for_mut(*reservation_id) {
                stay.checked_out_at = Some(*at);
                stay.checked_out_by = Some(*actor);
                stay.checkout_notes = notes.clone();
                stay.key_returned = true;
            }
            rs.room.status = RoomStatus::Available;
            rs.history.push(entry.clone());
        }
        Event::ReservationCancelled {
            reservation_id,
            cancellation,
            entry,
            ..
        } => {
            if let Some(reservation) = rs.reservation_mut(*reservation_id) {
                reservation.status = ReservationStatus::Cancelled;
                reservation.cancellation = Some(cancellation.clone());
            }
            rs.history.push(entry.clone());
        }
        Event::MarkedNoShow {
            reservation_id,
            entry,
            ..
        } => {
            if let Some(reservation) = rs.reservation_mut(*reservation_id) {
                reservation.status = ReservationStatus::NoShow;
            }
            rs.history.push(entry.clone());
        }
        Event::ReservationAnnotated { entry, .. } => {
            rs.history.push(entry.clone());
        }
        // Registration and season events live outside room state
        Event::RoomRegistered { .. }
        | Event::RoomTypeRegistered { .. }
        | Event::SeasonRuleAdded { .. }
        | Event::SeasonRuleRemoved { .. } => {}
    }
}

impl Engine {
    /// Open the engine, rebuilding state from the WAL at `wal_path`.
    /// Must be called inside a tokio runtime (spawns the WAL writer).
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            room_types: DashMap::new(),
            room_numbers: DashMap::new(),
            seasons: RwLock::new(SeasonTable::new()),
            index: ReservationIndex::default(),
            code_seq: AtomicU64::new(0),
            commit_gate: RwLock::new(()),
            wal_tx,
            notify,
        };

        // Sole owner of every lock here, so try_read/try_write always succeed.
        for event in &events {
            engine.replay_event(event);
        }
        engine
            .code_seq
            .store(engine.index.codes.len() as u64, Ordering::SeqCst);

        info!(
            events = events.len(),
            rooms = engine.rooms.len(),
            reservations = engine.index.rooms.len(),
            "engine state rebuilt from {}",
            wal_path.display()
        );
        Ok(engine)
    }

    fn replay_event(&self, event: &Event) {
        match event {
            Event::RoomTypeRegistered { room_type } => {
                self.room_types.insert(room_type.id, room_type.clone());
            }
            Event::RoomRegistered { room } => {
                self.room_numbers.insert(room.number, room.id);
                self.rooms
                    .insert(room.id, Arc::new(RwLock::new(RoomState::new(room.clone()))));
            }
            Event::SeasonRuleAdded { rule } => match self.seasons.try_write() {
                Ok(mut seasons) => seasons.insert(rule.clone()),
                Err(_) => warn!("replay: season table busy, rule {} skipped", rule.id),
            },
            Event::SeasonRuleRemoved { id } => match self.seasons.try_write() {
                Ok(mut seasons) => {
                    seasons.remove(*id);
                }
                Err(_) => warn!("replay: season table busy, removal of {id} skipped"),
            },
            other => {
                let Some(room_id) = other.room_id() else { return };
                let Some(rs) = self.get_room(&room_id) else {
                    warn!("replay: event for unknown room {room_id} skipped");
                    return;
                };
                match rs.try_write() {
                    Ok(mut guard) => apply_to_room(&mut guard, other, &self.index),
                    Err(_) => warn!("replay: room {room_id} busy, event skipped"),
                };
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.index.rooms.get(reservation_id).map(|e| *e.value())
    }

    /// WAL-append, apply, notify. Nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        room_id: Ulid,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.index);
        self.notify.send(room_id, event);
        Ok(())
    }

    /// Lookup reservation → room, acquire that room's write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        Ok((room_id, rs.write_owned().await))
    }

    /// Copy of the season table, taken without holding any room lock.
    pub(super) async fn season_snapshot(&self) -> SeasonTable {
        self.seasons.read().await.clone()
    }

    /// Next unused human-readable reservation code.
    pub(super) fn next_code(&self) -> String {
        loop {
            let seq = self.code_seq.fetch_add(1, Ordering::SeqCst) + 1;
            let code = format!("RES-{seq:06}");
            if !self.index.codes.contains_key(&code) {
                return code;
            }
        }
    }

    pub(super) fn room_type_capacity(&self, room_type_id: &Ulid) -> Result<u32, EngineError> {
        self.room_types
            .get(room_type_id)
            .map(|t| t.capacity)
            .ok_or(EngineError::NotFound(*room_type_id))
    }
}

/// Log and count an illegal transition before handing it to the caller.
pub(super) fn state_error(err: StateError) -> EngineError {
    warn!("rejected lifecycle transition: {err}");
    metrics::counter!(crate::observability::STATE_ERRORS_TOTAL).increment(1);
    EngineError::State(err)
}
