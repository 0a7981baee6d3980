use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, SharedRoomState};

impl Engine {
    fn room_handles(&self) -> Vec<SharedRoomState> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    /// Collect `(reservation, stay)` pairs across all rooms matching `keep`.
    async fn collect_reservations<F>(&self, mut keep: F) -> Vec<(Reservation, Option<Stay>)>
    where
        F: FnMut(&Reservation, Option<&Stay>) -> bool,
    {
        let mut out = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            for reservation in &guard.reservations {
                let stay = guard.stay_for(reservation.id);
                if keep(reservation, stay) {
                    out.push((reservation.clone(), stay.cloned()));
                }
            }
        }
        out
    }

    pub fn list_room_types(&self) -> Vec<RoomType> {
        let mut types: Vec<RoomType> = self.room_types.iter().map(|e| e.value().clone()).collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        types
    }

    pub async fn get_room_info(&self, id: Ulid) -> Option<RoomInfo> {
        let rs = self.get_room(&id)?;
        let guard = rs.read().await;
        let room_type = self.room_types.get(&guard.room.room_type_id)?;
        Some(RoomInfo::new(&guard.room, room_type.value()))
    }

    /// Rooms ordered by floor then number.
    pub async fn list_rooms(&self, include_inactive: bool) -> Vec<RoomInfo> {
        let mut rooms = Vec::new();
        for rs in self.room_handles() {
            let guard = rs.read().await;
            if !include_inactive && !guard.room.active {
                continue;
            }
            if let Some(room_type) = self.room_types.get(&guard.room.room_type_id) {
                rooms.push(RoomInfo::new(&guard.room, room_type.value()));
            }
        }
        rooms.sort_by_key(|r| (r.floor, r.number));
        rooms
    }

    pub async fn season_rules(&self) -> Vec<SeasonRule> {
        self.seasons.read().await.rules().to_vec()
    }

    pub async fn get_reservation(&self, id: Ulid) -> Option<Reservation> {
        let room_id = self.room_for_reservation(&id)?;
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        guard.reservation(id).cloned()
    }

    pub async fn find_by_code(&self, code: &str) -> Option<Reservation> {
        let id = *self.index.codes.get(code)?.value();
        self.get_reservation(id).await
    }

    pub async fn get_stay(&self, reservation_id: Ulid) -> Option<Stay> {
        let room_id = self.room_for_reservation(&reservation_id)?;
        let rs = self.get_room(&room_id)?;
        let guard = rs.read().await;
        guard.stay_for(reservation_id).cloned()
    }

    /// Transition trail of one reservation, oldest first.
    pub async fn reservation_history(&self, reservation_id: Ulid) -> Vec<HistoryEntry> {
        let Some(rs) = self
            .room_for_reservation(&reservation_id)
            .and_then(|room_id| self.get_room(&room_id))
        else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard.history_for(reservation_id).cloned().collect()
    }

    /// Non-cancelled reservations checking in within `[from, to]`, by arrival.
    pub async fn reservations_arriving(&self, from: NaiveDate, to: NaiveDate) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .collect_reservations(|r, _| {
                r.status != ReservationStatus::Cancelled
                    && r.check_in() >= from
                    && r.check_in() <= to
            })
            .await
            .into_iter()
            .map(|(r, _)| r)
            .collect();
        found.sort_by_key(|r| (r.check_in(), r.created_at));
        found
    }

    /// Confirmed reservations not yet past their checkout date.
    pub async fn active_reservations(&self, today: NaiveDate) -> Vec<Reservation> {
        let mut found: Vec<Reservation> = self
            .collect_reservations(|r, _| {
                r.status == ReservationStatus::Confirmed && r.check_out() >= today
            })
            .await
            .into_iter()
            .map(|(r, _)| r)
            .collect();
        found.sort_by_key(|r| (r.check_in(), r.created_at));
        found
    }

    /// Guests currently in the house: checked in, stay still open.
    pub async fn in_house(&self) -> Vec<(Reservation, Stay)> {
        let mut found: Vec<(Reservation, Stay)> = self
            .collect_reservations(|r, stay| {
                r.status == ReservationStatus::Completed && stay.is_some_and(Stay::is_open)
            })
            .await
            .into_iter()
            .filter_map(|(r, stay)| Some((r, stay?)))
            .collect();
        found.sort_by_key(|(_, stay)| stay.checked_in_at);
        found
    }

    /// Most recent departures first, at most `limit`.
    pub async fn departures(&self, limit: usize) -> Vec<(Reservation, Stay)> {
        let mut found: Vec<(Reservation, Stay)> = self
            .collect_reservations(|r, stay| {
                r.status == ReservationStatus::Completed && stay.is_some_and(|s| !s.is_open())
            })
            .await
            .into_iter()
            .filter_map(|(r, stay)| Some((r, stay?)))
            .collect();
        found.sort_by(|a, b| b.1.checked_out_at.cmp(&a.1.checked_out_at));
        found.truncate(limit);
        found
    }
}
