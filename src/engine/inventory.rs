use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::limits::MAX_STAY_NIGHTS;
use crate::model::*;

use super::{Engine, SharedRoomState};
use super::conflict::is_free;

impl Engine {
    /// Whether `room_id` is free for every night of `[check_in, check_out)`.
    ///
    /// `exclude` ignores one reservation, so an existing booking can be
    /// re-checked against everything else while it is being edited. An
    /// unknown room or an empty range is never available.
    pub async fn is_available(
        &self,
        room_id: Ulid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        exclude: Option<Ulid>,
    ) -> bool {
        let Some(span) = DateSpan::try_new(check_in, check_out) else {
            return false;
        };
        let Some(rs) = self.get_room(&room_id) else {
            return false;
        };
        let guard = rs.read().await;
        is_free(&guard, &span, exclude)
    }

    /// Rooms bookable for the whole stay, priced with the season table.
    ///
    /// Filters, in order: active, status `available`, room type, free for the
    /// dates, capacity. Sorted by floor then room number. A reversed or empty
    /// range, or no match, gives an empty list.
    pub async fn find_available_rooms(
        &self,
        check_in: NaiveDate,
        check_out: NaiveDate,
        room_type: Option<Ulid>,
        min_capacity: Option<u32>,
    ) -> Vec<RoomQuote> {
        let Some(span) = DateSpan::try_new(check_in, check_out) else {
            return Vec::new();
        };
        if span.nights() > MAX_STAY_NIGHTS {
            debug!("availability search {span} wider than {MAX_STAY_NIGHTS} nights");
            return Vec::new();
        }
        let started = std::time::Instant::now();
        let seasons = self.season_snapshot().await;

        let rooms: Vec<SharedRoomState> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut quotes = Vec::new();
        for rs in rooms {
            let guard = rs.read().await;
            let room = &guard.room;
            if !room.active || room.status != RoomStatus::Available {
                continue;
            }
            if room_type.is_some_and(|t| t != room.room_type_id) {
                continue;
            }
            if !is_free(&guard, &span, None) {
                continue;
            }
            let Some(info) = self
                .room_types
                .get(&room.room_type_id)
                .map(|t| RoomInfo::new(room, t.value()))
            else {
                continue;
            };
            if min_capacity.is_some_and(|c| info.capacity < c) {
                continue;
            }
            let Some((rate_per_night, total_for_stay)) = seasons.quote(room.base_rate, &span) else {
                warn!("room {} cannot be priced for {span}, skipped", room.number);
                continue;
            };
            quotes.push(RoomQuote {
                room: info,
                rate_per_night,
                total_for_stay,
            });
        }

        quotes.sort_by_key(|q| (q.room.floor, q.room.number));
        metrics::histogram!(crate::observability::AVAILABILITY_QUERY_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!("{} rooms free for {span}", quotes.len());
        quotes
    }

    /// Blended nightly rate for `base_rate` over `[check_in, check_out)`.
    pub async fn calculate_rate(
        &self,
        base_rate: Decimal,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Decimal {
        self.seasons
            .read()
            .await
            .calculate_rate(base_rate, check_in, check_out)
    }

    pub async fn nightly_breakdown(
        &self,
        base_rate: Decimal,
        check_in: NaiveDate,
        check_out: NaiveDate,
    ) -> Vec<NightlyRate> {
        self.seasons
            .read()
            .await
            .nightly_breakdown(base_rate, check_in, check_out)
    }
}
