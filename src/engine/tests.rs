use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use super::*;
use crate::notify::NotifyHub;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("fleetd_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn new_engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name), Arc::new(NotifyHub::new())).unwrap()
}

fn may(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2031, 5, day).unwrap()
}

fn customer(name: &str) -> Customer {
    Customer {
        name: name.into(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        phone: None,
    }
}

/// Seed the classic two-vehicle fleet: a 3-seater and a 7-seater.
async fn seed_fleet(engine: &Engine) -> (Ulid, Ulid) {
    let small = Ulid::new();
    let big = Ulid::new();
    engine
        .add_vehicle(small, "Skoda Octavia".into(), 3, "SK31 AAA".into(), true)
        .await
        .unwrap();
    engine
        .add_vehicle(big, "Mercedes V-Class".into(), 7, "SK31 BBB".into(), true)
        .await
        .unwrap();
    (small, big)
}

async fn seed_driver(engine: &Engine) -> Ulid {
    let id = Ulid::new();
    engine
        .add_driver(id, "Toby".into(), Some("+44 7700 900000".into()), true)
        .await
        .unwrap();
    id
}

fn plan(driver: Ulid, passengers: u32) -> TripPlan {
    TripPlan {
        pickup_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        pickup: "Inverness rail station".into(),
        dropoff: "Eilean Donan castle".into(),
        passengers,
        driver,
    }
}

async fn request(engine: &Engine, date: NaiveDate, party: PartySize) -> Result<(Ulid, Ulid), EngineError> {
    engine
        .request_booking(date, party, customer("Web Guest"), None, None)
        .await
}

// ── Fleet registry ───────────────────────────────────────

#[tokio::test]
async fn add_vehicle_and_list() {
    let engine = new_engine("add_vehicle.wal");
    let (small, big) = seed_fleet(&engine).await;

    let vehicles = engine.list_vehicles();
    assert_eq!(vehicles.len(), 2);
    assert!(vehicles.iter().any(|v| v.id == small && v.seats == 3));
    assert!(vehicles.iter().any(|v| v.id == big && v.seats == 7));
}

#[tokio::test]
async fn duplicate_vehicle_id_rejected() {
    let engine = new_engine("dup_vehicle.wal");
    let id = Ulid::new();
    engine
        .add_vehicle(id, "Octavia".into(), 3, "SK31 AAA".into(), true)
        .await
        .unwrap();
    let result = engine
        .add_vehicle(id, "Octavia again".into(), 3, "SK31 CCC".into(), true)
        .await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn duplicate_reg_plate_rejected() {
    let engine = new_engine("dup_plate.wal");
    engine
        .add_vehicle(Ulid::new(), "Octavia".into(), 3, "SK31 AAA".into(), true)
        .await
        .unwrap();
    let result = engine
        .add_vehicle(Ulid::new(), "Another".into(), 5, "sk31 aaa".into(), true)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn zero_seat_vehicle_rejected() {
    let engine = new_engine("zero_seats.wal");
    let result = engine
        .add_vehicle(Ulid::new(), "Ghost".into(), 0, "SK31 AAA".into(), true)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn fleet_snapshot_orders_by_seats_then_id() {
    let engine = new_engine("snapshot_order.wal");
    let (small, big) = seed_fleet(&engine).await;
    let inactive = Ulid::new();
    engine
        .add_vehicle(inactive, "Retired bus".into(), 9, "SK31 DDD".into(), false)
        .await
        .unwrap();

    let snapshot = engine.fleet_snapshot();
    assert_eq!(snapshot.len(), 2, "inactive vehicle must not appear");
    assert_eq!(snapshot[0].id, small);
    assert_eq!(snapshot[1].id, big);
}

// ── Allocation Service ───────────────────────────────────

#[tokio::test]
async fn small_party_gets_smallest_fit() {
    let engine = new_engine("alloc_smallest.wal");
    let (small, _) = seed_fleet(&engine).await;

    let (_, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_eq!(vehicle, small);
}

#[tokio::test]
async fn second_small_party_moves_up_to_the_big_vehicle() {
    let engine = new_engine("alloc_second.wal");
    let (small, big) = seed_fleet(&engine).await;

    let (_, first) = request(&engine, may(10), PartySize::Small).await.unwrap();
    let (_, second) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_eq!(first, small);
    assert_eq!(second, big);
}

#[tokio::test]
async fn large_party_takes_the_only_big_vehicle() {
    let engine = new_engine("alloc_large.wal");
    let (_, big) = seed_fleet(&engine).await;

    request(&engine, may(10), PartySize::Small).await.unwrap();
    let (_, vehicle) = request(&engine, may(10), PartySize::Large).await.unwrap();
    assert_eq!(vehicle, big);
}

#[tokio::test]
async fn full_date_returns_no_capacity_and_creates_nothing() {
    let engine = new_engine("alloc_full.wal");
    seed_fleet(&engine).await;

    request(&engine, may(10), PartySize::Small).await.unwrap();
    request(&engine, may(10), PartySize::Small).await.unwrap();
    let result = request(&engine, may(10), PartySize::Large).await;
    assert!(matches!(result, Err(EngineError::NoCapacity)));

    // The failed request must not have left a booking behind.
    assert_eq!(engine.bookings_for_date(may(10)).await.len(), 2);
}

#[tokio::test]
async fn other_dates_are_unaffected() {
    let engine = new_engine("alloc_dates.wal");
    let (small, _) = seed_fleet(&engine).await;

    request(&engine, may(10), PartySize::Small).await.unwrap();
    let (_, vehicle) = request(&engine, may(11), PartySize::Small).await.unwrap();
    assert_eq!(vehicle, small);
}

#[tokio::test]
async fn inactive_vehicle_is_never_allocated() {
    let engine = new_engine("alloc_inactive.wal");
    let (small, big) = seed_fleet(&engine).await;
    engine
        .update_vehicle(big, "Mercedes V-Class".into(), 7, false)
        .await
        .unwrap();

    let (_, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_eq!(vehicle, small);
    let result = request(&engine, may(10), PartySize::Small).await;
    assert!(matches!(result, Err(EngineError::NoCapacity)));
}

#[tokio::test]
async fn concurrent_requests_never_double_book() {
    let engine = Arc::new(new_engine("alloc_race.wal"));
    seed_fleet(&engine).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            request(&engine, may(10), PartySize::Small).await
        }));
    }

    let mut vehicles = Vec::new();
    let mut failures = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok((_, vehicle)) => vehicles.push(vehicle),
            Err(EngineError::NoCapacity) => failures += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(vehicles.len(), 2, "two vehicles, two winners");
    assert_eq!(failures, 6);
    vehicles.sort();
    vehicles.dedup();
    assert_eq!(vehicles.len(), 2, "each winner got a distinct vehicle");
}

// ── Manual bookings & assignment ─────────────────────────

#[tokio::test]
async fn unassigned_manual_booking_consumes_capacity() {
    let engine = new_engine("manual_consumes.wal");
    engine
        .add_vehicle(Ulid::new(), "Octavia".into(), 3, "SK31 AAA".into(), true)
        .await
        .unwrap();

    engine
        .add_manual_booking(may(10), PartySize::Small, customer("Phone Guest"), None, None)
        .await
        .unwrap();

    let result = request(&engine, may(10), PartySize::Small).await;
    assert!(matches!(result, Err(EngineError::NoCapacity)));
}

#[tokio::test]
async fn unassigned_large_that_fits_nothing_blocks_nobody() {
    // One 3-seater, one manual Large booking no vehicle can serve: the
    // virtual pass reserves nothing for it and a Small party still books.
    let engine = new_engine("manual_misfit.wal");
    let small = Ulid::new();
    engine
        .add_vehicle(small, "Octavia".into(), 3, "SK31 AAA".into(), true)
        .await
        .unwrap();

    engine
        .add_manual_booking(may(10), PartySize::Large, customer("Big Group"), None, None)
        .await
        .unwrap();

    let (_, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_eq!(vehicle, small);
}

#[tokio::test]
async fn assign_vehicle_auto_picks_smallest_fit() {
    let engine = new_engine("assign_auto.wal");
    let (small, _) = seed_fleet(&engine).await;

    let id = engine
        .add_manual_booking(may(10), PartySize::Small, customer("Phone Guest"), None, None)
        .await
        .unwrap();
    let chosen = engine.assign_vehicle(id, None).await.unwrap();
    assert_eq!(chosen, small);

    let booking = engine.get_booking(id).await.unwrap();
    assert_eq!(booking.vehicle, Some(small));
}

#[tokio::test]
async fn assign_vehicle_explicit_pick_is_validated() {
    let engine = new_engine("assign_explicit.wal");
    let (small, big) = seed_fleet(&engine).await;

    let id = engine
        .add_manual_booking(may(10), PartySize::Large, customer("Big Group"), None, None)
        .await
        .unwrap();

    // Too small for a Large party
    let result = engine.assign_vehicle(id, Some(small)).await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));

    // The right pick works
    assert_eq!(engine.assign_vehicle(id, Some(big)).await.unwrap(), big);

    // And never twice
    let result = engine.assign_vehicle(id, Some(big)).await;
    assert!(matches!(result, Err(EngineError::AlreadyAssigned(_))));
}

#[tokio::test]
async fn assign_vehicle_refuses_an_occupied_vehicle() {
    let engine = new_engine("assign_conflict.wal");
    let (small, _) = seed_fleet(&engine).await;

    request(&engine, may(10), PartySize::Small).await.unwrap(); // takes the 3-seater
    let id = engine
        .add_manual_booking(may(10), PartySize::Small, customer("Phone Guest"), None, None)
        .await
        .unwrap();

    let result = engine.assign_vehicle(id, Some(small)).await;
    assert!(matches!(result, Err(EngineError::Conflict { .. })));
}

// ── Lifecycle: schedule, confirm, cancel ─────────────────

#[tokio::test]
async fn schedule_rejects_passenger_count_outside_class() {
    let engine = new_engine("schedule_passengers.wal");
    seed_fleet(&engine).await;
    let driver = seed_driver(&engine).await;

    let (id, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    let result = engine.schedule_booking(id, plan(driver, 5)).await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
    engine.schedule_booking(id, plan(driver, 2)).await.unwrap();
}

#[tokio::test]
async fn schedule_rejects_unknown_or_inactive_driver() {
    let engine = new_engine("schedule_driver.wal");
    seed_fleet(&engine).await;

    let (id, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    let result = engine.schedule_booking(id, plan(Ulid::new(), 2)).await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));

    let retired = Ulid::new();
    engine
        .add_driver(retired, "Retired".into(), None, false)
        .await
        .unwrap();
    let result = engine.schedule_booking(id, plan(retired, 2)).await;
    assert!(matches!(result, Err(EngineError::InvalidInput(_))));
}

#[tokio::test]
async fn confirm_is_gated_on_vehicle_and_plan() {
    let engine = new_engine("confirm_gate.wal");
    seed_fleet(&engine).await;
    let driver = seed_driver(&engine).await;

    // Manual booking: no vehicle yet → not schedulable
    let manual = engine
        .add_manual_booking(may(10), PartySize::Small, customer("Phone Guest"), None, None)
        .await
        .unwrap();
    assert!(matches!(
        engine.confirm_booking(manual).await,
        Err(EngineError::NotSchedulable(_))
    ));

    // Web booking: vehicle assigned but no plan → still not schedulable
    let (web, _) = request(&engine, may(11), PartySize::Small).await.unwrap();
    assert!(matches!(
        engine.confirm_booking(web).await,
        Err(EngineError::NotSchedulable(_))
    ));

    // With a plan it confirms
    engine.schedule_booking(web, plan(driver, 2)).await.unwrap();
    engine.confirm_booking(web).await.unwrap();
    assert_eq!(
        engine.get_booking(web).await.unwrap().status,
        BookingStatus::Confirmed
    );

    // Confirming twice is a refused no-op transition
    assert!(matches!(
        engine.confirm_booking(web).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn cancel_frees_the_vehicle_for_the_date() {
    let engine = new_engine("cancel_frees.wal");
    let (small, _) = seed_fleet(&engine).await;

    let (first, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_eq!(vehicle, small);
    request(&engine, may(10), PartySize::Small).await.unwrap();
    assert!(matches!(
        request(&engine, may(10), PartySize::Small).await,
        Err(EngineError::NoCapacity)
    ));

    engine.cancel_booking(first).await.unwrap();

    // No cleanup step needed: the next run simply no longer sees it.
    let (_, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_eq!(vehicle, small);
}

#[tokio::test]
async fn reconfirming_a_cancelled_booking_rechecks_the_vehicle() {
    let engine = new_engine("reconfirm_conflict.wal");
    let small = Ulid::new();
    engine
        .add_vehicle(small, "Octavia".into(), 3, "SK31 AAA".into(), true)
        .await
        .unwrap();
    let driver = seed_driver(&engine).await;

    let (first, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    engine.schedule_booking(first, plan(driver, 2)).await.unwrap();
    engine.cancel_booking(first).await.unwrap();

    // Someone else takes the freed vehicle
    request(&engine, may(10), PartySize::Small).await.unwrap();

    // Un-cancelling would double-book the 3-seater
    assert!(matches!(
        engine.confirm_booking(first).await,
        Err(EngineError::Conflict { .. })
    ));
}

#[tokio::test]
async fn nothing_reenters_pending_and_unknown_ids_fail() {
    let engine = new_engine("transitions.wal");
    seed_fleet(&engine).await;

    assert!(matches!(
        engine.cancel_booking(Ulid::new()).await,
        Err(EngineError::NotFound(_))
    ));

    let (id, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    engine.cancel_booking(id).await.unwrap();
    assert!(matches!(
        engine.cancel_booking(id).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

// ── Availability Scanner ─────────────────────────────────

#[tokio::test]
async fn empty_month_with_a_fleet_has_no_fully_booked_dates() {
    let engine = new_engine("scan_empty.wal");
    seed_fleet(&engine).await;

    let full = engine.scan_month(2031, 5, PartySize::Small).await.unwrap();
    assert!(full.is_empty());
}

#[tokio::test]
async fn scan_marks_exactly_the_full_days() {
    let engine = new_engine("scan_full_days.wal");
    seed_fleet(&engine).await;

    // Fill May 10 completely; take only the big vehicle on May 12.
    request(&engine, may(10), PartySize::Small).await.unwrap();
    request(&engine, may(10), PartySize::Small).await.unwrap();
    request(&engine, may(12), PartySize::Large).await.unwrap();

    let full_small = engine.scan_month(2031, 5, PartySize::Small).await.unwrap();
    assert_eq!(full_small, vec![may(10)]);

    // For Large parties, May 12 is also gone (only the 7-seater fits them).
    let full_large = engine.scan_month(2031, 5, PartySize::Large).await.unwrap();
    assert_eq!(full_large, vec![may(10), may(12)]);
}

#[tokio::test]
async fn scan_with_no_fleet_marks_every_day() {
    let engine = new_engine("scan_no_fleet.wal");
    let full = engine.scan_month(2031, 5, PartySize::Small).await.unwrap();
    assert_eq!(full.len(), 31);
}

#[tokio::test]
async fn scan_never_mutates_the_ledger() {
    let engine = new_engine("scan_readonly.wal");
    seed_fleet(&engine).await;
    request(&engine, may(10), PartySize::Small).await.unwrap();

    let before = engine.bookings_for_date(may(10)).await;
    engine.scan_month(2031, 5, PartySize::Small).await.unwrap();
    engine.scan_month(2031, 5, PartySize::Large).await.unwrap();
    let after = engine.bookings_for_date(may(10)).await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn scan_rejects_nonsense_months() {
    let engine = new_engine("scan_bad_month.wal");
    assert!(engine.scan_month(2031, 13, PartySize::Small).await.is_err());
    assert!(engine.scan_month(2031, 0, PartySize::Small).await.is_err());
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn restart_replays_fleet_and_ledger() {
    let path = test_wal_path("restart_replay.wal");
    let driver;
    let booking_id;
    let small;
    {
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        let ids = seed_fleet(&engine).await;
        small = ids.0;
        driver = seed_driver(&engine).await;
        let (id, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
        assert_eq!(vehicle, small);
        engine.schedule_booking(id, plan(driver, 2)).await.unwrap();
        engine.confirm_booking(id).await.unwrap();
        booking_id = id;
    }

    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(engine.list_vehicles().len(), 2);
    assert_eq!(engine.list_drivers().len(), 1);

    let booking = engine.get_booking(booking_id).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.vehicle, Some(small));
    assert_eq!(booking.plan.as_ref().unwrap().driver, driver);

    // Replayed occupancy still counts: the 3-seater is taken on May 10.
    let (_, vehicle) = request(&engine, may(10), PartySize::Small).await.unwrap();
    assert_ne!(vehicle, small);
}

#[tokio::test]
async fn compaction_preserves_state_and_resets_the_counter() {
    let path = test_wal_path("compact_state.wal");
    let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
    seed_fleet(&engine).await;

    let (keep, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    let (gone, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    engine.cancel_booking(gone).await.unwrap();

    assert!(engine.wal_appends_since_compact().await > 0);
    engine.compact_wal().await.unwrap();
    assert_eq!(engine.wal_appends_since_compact().await, 0);

    // A fresh engine from the compacted log sees the same world.
    drop(engine);
    let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
    assert_eq!(engine.list_vehicles().len(), 2);
    assert_eq!(
        engine.get_booking(keep).await.unwrap().status,
        BookingStatus::Pending
    );
    assert_eq!(
        engine.get_booking(gone).await.unwrap().status,
        BookingStatus::Cancelled
    );
}

// ── Notifications ────────────────────────────────────────

#[tokio::test]
async fn lifecycle_changes_reach_date_subscribers() {
    let notify = Arc::new(NotifyHub::new());
    let engine = Engine::new(test_wal_path("notify_feed.wal"), notify.clone()).unwrap();
    seed_fleet(&engine).await;

    let mut rx = notify.subscribe(may(10));
    let (id, _) = request(&engine, may(10), PartySize::Small).await.unwrap();
    engine.cancel_booking(id).await.unwrap();

    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::BookingRequested { .. }
    ));
    assert!(matches!(
        rx.recv().await.unwrap(),
        Event::BookingCancelled { .. }
    ));
}
