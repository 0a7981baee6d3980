use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Local, NaiveDate};
use rust_decimal::Decimal;
use ulid::Ulid;

use hotel_engine::engine::{Engine, EngineError, ErrorKind, NewReservation};
use hotel_engine::model::{Event, ReservationStatus, RoomStatus};
use hotel_engine::notify::NotifyHub;

// ── Test infrastructure ──────────────────────────────────────

fn day(offset: i64) -> NaiveDate {
    Local::now().date_naive() + Duration::days(offset)
}

fn fresh_wal() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("hotel_engine_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("hotel.wal")
}

struct Desk {
    engine: Arc<Engine>,
    notify: Arc<NotifyHub>,
    clerk: Ulid,
}

async fn open_desk(path: PathBuf) -> Desk {
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(path, notify.clone()).unwrap());
    Desk {
        engine,
        notify,
        clerk: Ulid::new(),
    }
}

impl Desk {
    fn booking(&self, room_id: Ulid, from: i64, to: i64, adults: u32) -> NewReservation {
        NewReservation {
            guest_id: Ulid::new(),
            room_id,
            check_in: day(from),
            check_out: day(to),
            adults,
            children: 0,
            notes: Some("booked at the desk".into()),
            actor: self.clerk,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn search_book_stay_and_leave() {
    let path = fresh_wal();
    let desk = open_desk(path.clone()).await;
    let engine = &desk.engine;

    let twin = Ulid::new();
    engine.register_room_type(twin, "Twin", 2).await.unwrap();
    let (r12, r11) = (Ulid::new(), Ulid::new());
    engine
        .register_room(r12, 12, 1, twin, Decimal::new(9000, 2), RoomStatus::Available)
        .await
        .unwrap();
    engine
        .register_room(r11, 11, 1, twin, Decimal::new(9000, 2), RoomStatus::Available)
        .await
        .unwrap();
    engine
        .add_season_rule(Ulid::new(), Some("Weekend".into()), day(1), day(1), "1.5".parse().unwrap())
        .await
        .unwrap();

    // Search, then book the first quote
    let quotes = engine.find_available_rooms(day(0), day(2), None, Some(2)).await;
    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].room.number, 11);
    // (90 + 135) / 2
    assert_eq!(quotes[0].rate_per_night, "112.50".parse::<Decimal>().unwrap());

    let mut feed = desk.notify.subscribe(r11);
    let res = engine
        .create_reservation(desk.booking(quotes[0].room.id, 0, 2, 2))
        .await
        .unwrap();
    assert_eq!(res.total_rate, quotes[0].total_for_stay);
    assert!(matches!(feed.recv().await.unwrap(), Event::ReservationCreated { .. }));

    let left = engine.find_available_rooms(day(0), day(2), None, None).await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].room.id, r12);

    // Someone else tries the same room
    let err = engine
        .create_reservation(desk.booking(r11, 1, 3, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    engine.check_in(res.id, r11, desk.clerk).await.unwrap();
    assert!(matches!(feed.recv().await.unwrap(), Event::CheckedIn { .. }));
    let (guest, stay) = engine.in_house().await.pop().unwrap();
    assert_eq!(guest.id, res.id);
    assert_eq!(stay.room_id, r11);

    engine
        .check_out(res.id, r11, desk.clerk, None)
        .await
        .unwrap();
    assert!(matches!(feed.recv().await.unwrap(), Event::CheckedOut { .. }));

    // State survives a restart, history included
    drop(desk);
    let desk = open_desk(path).await;
    let after = desk.engine.find_by_code(&res.code).await.unwrap();
    assert_eq!(after.status, ReservationStatus::Completed);
    assert_eq!(desk.engine.reservation_history(res.id).await.len(), 3);
    assert_eq!(
        desk.engine.get_room_info(r11).await.unwrap().status,
        RoomStatus::Available
    );
}

#[tokio::test]
async fn cancellation_returns_nights_to_inventory() {
    let desk = open_desk(fresh_wal()).await;
    let engine = &desk.engine;

    let single = Ulid::new();
    engine.register_room_type(single, "Single", 1).await.unwrap();
    let room = Ulid::new();
    engine
        .register_room(room, 7, 0, single, Decimal::from(60), RoomStatus::Available)
        .await
        .unwrap();

    let res = engine
        .create_reservation(desk.booking(room, 5, 9, 1))
        .await
        .unwrap();
    assert!(engine.find_available_rooms(day(6), day(7), None, None).await.is_empty());

    engine
        .cancel_reservation(res.id, "guest request", desk.clerk, true)
        .await
        .unwrap();
    assert_eq!(engine.find_available_rooms(day(6), day(7), None, None).await.len(), 1);

    let again = engine
        .cancel_reservation(res.id, "guest request", desk.clerk, true)
        .await;
    assert!(matches!(again, Err(EngineError::State(_))));
}
