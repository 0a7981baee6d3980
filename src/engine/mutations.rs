use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use tokio::sync::{RwLock, oneshot};
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{validate_base_rate, validate_multiplier, validate_text};
use super::{Engine, EngineError, ValidationError, WalCommand};

impl Engine {
    pub async fn register_room_type(
        &self,
        id: Ulid,
        name: impl Into<String>,
        capacity: u32,
    ) -> Result<(), EngineError> {
        let name = name.into();
        validate_text(Some(&name), MAX_NAME_LEN, "room type name too long")?;
        if capacity == 0 {
            return Err(ValidationError::ZeroCapacity.into());
        }
        if self.room_types.len() >= MAX_ROOM_TYPES {
            return Err(ValidationError::LimitExceeded("too many room types").into());
        }

        let _commit = self.commit_gate.read().await;
        let room_type = RoomType { id, name, capacity };
        // Claim the id before the WAL write; released again if the write fails.
        match self.room_types.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(room_type.clone());
            }
        }
        if let Err(e) = self.wal_append(&Event::RoomTypeRegistered { room_type }).await {
            self.room_types.remove(&id);
            return Err(e);
        }
        info!("room type {id} registered (capacity {capacity})");
        Ok(())
    }

    /// Add a room to the inventory.
    ///
    /// `status` is the room's starting operational state. Only check-in and
    /// check-out change it afterwards, so a room registered as anything other
    /// than `Available` stays out of search and check-in for good; register
    /// it `Available` and deactivate it with [`Engine::update_room`] instead.
    pub async fn register_room(
        &self,
        id: Ulid,
        number: u32,
        floor: i32,
        room_type_id: Ulid,
        base_rate: Decimal,
        status: RoomStatus,
    ) -> Result<(), EngineError> {
        validate_base_rate(base_rate)?;
        if self.rooms.len() >= MAX_ROOMS {
            return Err(ValidationError::LimitExceeded("too many rooms").into());
        }
        if !self.room_types.contains_key(&room_type_id) {
            return Err(EngineError::NotFound(room_type_id));
        }

        let _commit = self.commit_gate.read().await;
        let room = Room {
            id,
            number,
            floor,
            room_type_id,
            status,
            base_rate,
            active: true,
        };
        let state = Arc::new(RwLock::new(RoomState::new(room.clone())));
        // Held until the WAL commit, so nothing reads or books the room first.
        let mut pending = state.clone().write_owned().await;

        // Claim id and number before the WAL write so two registrations can't
        // both take them; released again if the write fails.
        match self.rooms.entry(id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                slot.insert(state);
            }
        }
        match self.room_numbers.entry(number) {
            Entry::Occupied(_) => {
                self.rooms.remove(&id);
                return Err(ValidationError::DuplicateRoomNumber(number).into());
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        let event = Event::RoomRegistered { room };
        if let Err(e) = self.wal_append(&event).await {
            self.room_numbers.remove(&number);
            self.rooms.remove(&id);
            // Anyone already waiting on the lock must find it unbookable
            pending.room.active = false;
            return Err(e);
        }
        drop(pending);
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::ROOMS_REGISTERED).set(self.rooms.len() as f64);
        info!("room {number} registered on floor {floor}");
        Ok(())
    }

    /// Administrative edit of rate and active flag. Status is left to the
    /// reservation lifecycle.
    pub async fn update_room(
        &self,
        id: Ulid,
        base_rate: Option<Decimal>,
        active: Option<bool>,
    ) -> Result<(), EngineError> {
        if let Some(rate) = base_rate {
            validate_base_rate(rate)?;
        }

        let _commit = self.commit_gate.read().await;
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        let event = Event::RoomUpdated {
            id,
            base_rate: base_rate.unwrap_or(guard.room.base_rate),
            active: active.unwrap_or(guard.room.active),
        };
        self.persist_and_apply(id, &mut guard, &event).await?;
        info!(
            "room {} updated: rate {}, active {}",
            guard.room.number, guard.room.base_rate, guard.room.active
        );
        Ok(())
    }

    pub async fn add_season_rule(
        &self,
        id: Ulid,
        name: Option<String>,
        start: NaiveDate,
        end: NaiveDate,
        multiplier: Decimal,
    ) -> Result<(), EngineError> {
        validate_text(name.as_deref(), MAX_NAME_LEN, "season name too long")?;
        if end < start {
            return Err(ValidationError::SeasonRange { start, end }.into());
        }
        validate_multiplier(multiplier)?;

        let _commit = self.commit_gate.read().await;
        let mut seasons = self.seasons.write().await;
        if seasons.len() >= MAX_SEASON_RULES {
            return Err(ValidationError::LimitExceeded("too many season rules").into());
        }
        if seasons.contains(id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let rule = SeasonRule {
            id,
            name,
            start,
            end,
            multiplier,
        };
        self.wal_append(&Event::SeasonRuleAdded { rule: rule.clone() })
            .await?;
        seasons.insert(rule);
        info!("season rule {id} added: {start}..={end} x{multiplier}");
        Ok(())
    }

    pub async fn remove_season_rule(&self, id: Ulid) -> Result<(), EngineError> {
        let _commit = self.commit_gate.read().await;
        let mut seasons = self.seasons.write().await;
        if !seasons.contains(id) {
            return Err(EngineError::NotFound(id));
        }
        self.wal_append(&Event::SeasonRuleRemoved { id }).await?;
        seasons.remove(id);
        info!("season rule {id} removed");
        Ok(())
    }

    /// Rewrite the WAL as the minimal event list recreating current state.
    /// Reservations are kept whole, including their history trail.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _exclusive = self.commit_gate.write().await;

        let mut events: Vec<Event> = self
            .room_types
            .iter()
            .map(|e| Event::RoomTypeRegistered {
                room_type: e.value().clone(),
            })
            .collect();
        events.extend(
            self.seasons
                .read()
                .await
                .rules()
                .iter()
                .map(|rule| Event::SeasonRuleAdded { rule: rule.clone() }),
        );

        let mut rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        rooms.sort_by_key(|rs| rs.try_read().map(|g| g.room.number).unwrap_or(u32::MAX));
        for rs in rooms {
            let guard = rs.read().await;
            events.push(Event::RoomRegistered {
                room: guard.room.clone(),
            });
            for reservation in &guard.reservations {
                events.push(Event::ReservationRestored {
                    reservation: reservation.clone(),
                    stay: guard.stay_for(reservation.id).cloned(),
                    history: guard.history_for(reservation.id).cloned().collect(),
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        info!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
