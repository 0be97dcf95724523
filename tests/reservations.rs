mod common;

use std::sync::Arc;
use std::thread;

use chrono::Duration;
use common::*;
use table_reservations::capacity;
use table_reservations::errors::ReservationError;
use table_reservations::models::{ReservationStatus, TripleQuery, UnavailableReason};
use table_reservations::store::ReservationStore;

#[test]
fn reserve_creates_pending_reservation() {
    let h = harness();
    let r = h.service.reserve(request("42", tomorrow(), at(18, 0), 2)).unwrap();
    assert_eq!(r.status, ReservationStatus::Pending);
    assert_eq!(r.created_at, now());
    assert!(!r.has_preorder);
    assert_eq!(h.service.get(r.id).unwrap(), r);
}

#[test]
fn identical_second_request_is_a_duplicate() {
    let h = harness();
    h.service.reserve(request("42", tomorrow(), at(18, 0), 1)).unwrap();
    let err = h.service.reserve(request("42", tomorrow(), at(18, 0), 1)).unwrap_err();
    assert!(matches!(err, ReservationError::DuplicateBooking { .. }));
}

#[test]
fn duplicate_wins_over_capacity_when_owner_took_last_table() {
    let h = harness_with_tables(1);
    h.service.reserve(request("42", tomorrow(), at(18, 0), 1)).unwrap();
    let err = h.service.reserve(request("42", tomorrow(), at(18, 0), 1)).unwrap_err();
    assert!(matches!(err, ReservationError::DuplicateBooking { .. }));
}

#[test]
fn owner_may_rebook_after_cancelling() {
    let h = harness();
    let first = h.service.reserve(request("42", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.cancel(first.id).unwrap();
    let second = h.service.reserve(request("42", tomorrow(), at(18, 0), 1)).unwrap();
    assert_ne!(first.id, second.id);
}

#[test]
fn closing_time_boundary() {
    let h = harness();
    assert!(h.service.reserve(request("1", tomorrow(), at(22, 0), 1)).is_ok());
    let err = h.service.reserve(request("2", tomorrow(), at(22, 0), 2)).unwrap_err();
    assert!(matches!(err, ReservationError::OutOfHours { .. }));

    let report = h.service.check_availability(&slot(tomorrow(), at(22, 0), 2)).unwrap();
    assert_eq!(report.free, 0);
    assert_eq!(report.reason, Some(UnavailableReason::ClosingTime));
}

#[test]
fn same_day_buffer() {
    let h = harness();
    let err = h.service.reserve(request("1", today(), at(14, 30), 1)).unwrap_err();
    assert!(matches!(err, ReservationError::TooSoon { .. }));
    assert_eq!(
        h.service.check_availability(&slot(today(), at(14, 30), 1)).unwrap().reason,
        Some(UnavailableReason::TimePassed)
    );

    assert!(h.service.reserve(request("2", today(), at(15, 10), 1)).is_ok());
    assert!(h.service.reserve(request("3", tomorrow(), at(0, 1), 1)).is_ok());
}

#[test]
fn earlier_today_is_too_soon() {
    let h = harness();
    let err = h.service.reserve(request("1", today(), at(10, 0), 1)).unwrap_err();
    assert!(matches!(err, ReservationError::TooSoon { .. }));
}

#[test]
fn invalid_requests_are_rejected() {
    let h = harness();
    let mut bad_venue = request("1", tomorrow(), at(12, 0), 1);
    bad_venue.venue_id = 99;
    assert!(matches!(h.service.reserve(bad_venue), Err(ReservationError::InvalidInput(_))));

    assert!(matches!(
        h.service.reserve(request("1", tomorrow(), at(12, 0), 0)),
        Err(ReservationError::InvalidInput(_))
    ));

    let mut bad_phone = request("1", tomorrow(), at(12, 0), 1);
    bad_phone.customer_phone = "nope".into();
    assert!(matches!(h.service.reserve(bad_phone), Err(ReservationError::InvalidInput(_))));

    let mut no_name = request("1", tomorrow(), at(12, 0), 1);
    no_name.customer_name = "  ".into();
    assert!(matches!(h.service.reserve(no_name), Err(ReservationError::InvalidInput(_))));

    assert_eq!(
        h.service.check_availability(&slot(tomorrow(), at(12, 0), -1)).unwrap().reason,
        Some(UnavailableReason::InvalidInput)
    );
}

#[test]
fn full_venue_rejects_overlap_but_not_adjacent_slot() {
    let h = harness();
    for owner in 0..5 {
        h.service
            .reserve(request(&owner.to_string(), tomorrow(), at(18, 0), 2))
            .unwrap();
    }

    let report = h.service.check_availability(&slot(tomorrow(), at(19, 0), 1)).unwrap();
    assert_eq!(report.free, 0);
    assert_eq!(report.reason, Some(UnavailableReason::NoCapacity));
    let err = h.service.reserve(request("late", tomorrow(), at(19, 0), 1)).unwrap_err();
    assert!(matches!(err, ReservationError::NoCapacity { .. }));

    assert_eq!(h.service.check_availability(&slot(tomorrow(), at(20, 0), 1)).unwrap().free, 5);
    assert!(h.service.reserve(request("late", tomorrow(), at(20, 0), 1)).is_ok());
}

#[test]
fn other_venue_and_date_do_not_count() {
    let h = harness_with_tables(1);
    h.service.reserve(request("a", tomorrow(), at(18, 0), 2)).unwrap();

    let mut other_venue = request("b", tomorrow(), at(18, 0), 2);
    other_venue.venue_id = 2;
    assert!(h.service.reserve(other_venue).is_ok());

    let next_day = tomorrow() + Duration::days(1);
    assert!(h.service.reserve(request("c", next_day, at(18, 0), 2)).is_ok());
}

#[test]
fn positive_check_means_reserve_has_room() {
    let h = harness_with_tables(2);
    h.service.reserve(request("a", tomorrow(), at(18, 0), 2)).unwrap();
    let query = slot(tomorrow(), at(19, 0), 1);
    assert_eq!(h.service.check_availability(&query).unwrap().free, 1);
    assert!(h.service.reserve(request("b", tomorrow(), at(19, 0), 1)).is_ok());
    assert_eq!(h.service.check_availability(&query).unwrap().free, 0);
}

#[test]
fn cancelling_frees_the_table() {
    let h = harness_with_tables(1);
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 2)).unwrap();
    assert_eq!(h.service.check_availability(&slot(tomorrow(), at(18, 0), 1)).unwrap().free, 0);
    h.service.cancel(r.id).unwrap();
    assert_eq!(h.service.check_availability(&slot(tomorrow(), at(18, 0), 1)).unwrap().free, 1);
}

#[test]
fn cancel_then_mark_preorder_is_invalid() {
    let h = harness();
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.confirm(r.id).unwrap();
    h.service.cancel(r.id).unwrap();
    let err = h.service.mark_preorder(r.id).unwrap_err();
    assert!(matches!(
        err,
        ReservationError::InvalidState {
            status: ReservationStatus::Cancelled,
            ..
        }
    ));
}

#[test]
fn preorder_requires_confirmation() {
    let h = harness();
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    assert!(matches!(h.service.mark_preorder(r.id), Err(ReservationError::InvalidState { .. })));

    h.service.confirm(r.id).unwrap();
    let marked = h.service.mark_preorder(r.id).unwrap();
    assert!(marked.has_preorder);
    assert_eq!(marked.preorder_marked_at, Some(now()));

    let cleared = h.service.remove_preorder(r.id).unwrap();
    assert!(!cleared.has_preorder);
    assert!(cleared.preorder_marked_at.is_none());
}

#[test]
fn cancel_clears_preorder() {
    let h = harness();
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.confirm(r.id).unwrap();
    h.service.mark_preorder(r.id).unwrap();
    let cancelled = h.service.cancel(r.id).unwrap();
    assert!(!cancelled.has_preorder);
    assert!(cancelled.preorder_marked_at.is_none());
}

#[test]
fn confirm_cancel_confirm_ends_confirmed() {
    let h = harness();
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    let first = h.service.confirm(r.id).unwrap();
    assert_eq!(first.confirmed_at, Some(now()));

    h.clock.advance(Duration::minutes(10));
    h.service.cancel(r.id).unwrap();

    h.clock.advance(Duration::minutes(10));
    let second = h.service.confirm(r.id).unwrap();
    assert_eq!(second.status, ReservationStatus::Confirmed);
    assert_eq!(second.confirmed_at, Some(now() + Duration::minutes(20)));
    assert!(second.cancelled_at.is_none());
}

#[test]
fn reinstating_confirm_respects_capacity() {
    let h = harness_with_tables(1);
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.cancel(r.id).unwrap();
    h.service.reserve(request("b", tomorrow(), at(18, 0), 1)).unwrap();

    let err = h.service.confirm(r.id).unwrap_err();
    assert!(matches!(err, ReservationError::NoCapacity { .. }));
    assert_eq!(h.service.get(r.id).unwrap().status, ReservationStatus::Cancelled);
}

#[test]
fn reinstating_confirm_respects_duplicate_guard() {
    let h = harness();
    let old = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.cancel(old.id).unwrap();
    h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();

    let err = h.service.confirm(old.id).unwrap_err();
    assert!(matches!(err, ReservationError::DuplicateBooking { .. }));
}

#[test]
fn recancel_keeps_first_timestamp() {
    let h = harness();
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    let first = h.service.cancel(r.id).unwrap();
    h.clock.advance(Duration::hours(1));
    let again = h.service.cancel(r.id).unwrap();
    assert_eq!(again.cancelled_at, first.cancelled_at);
    assert_eq!(again.cancelled_at, Some(now()));
}

#[test]
fn lifecycle_on_missing_reservation_is_not_found() {
    let h = harness();
    let id = uuid::Uuid::new_v4();
    assert!(matches!(h.service.confirm(id), Err(ReservationError::NotFound(_))));
    assert!(matches!(h.service.cancel(id), Err(ReservationError::NotFound(_))));
    assert!(matches!(h.service.delete(id), Err(ReservationError::NotFound(_))));
}

#[test]
fn triple_lookup_resolves_active_reservation() {
    let h = harness();
    let old = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.cancel(old.id).unwrap();

    let key = TripleQuery {
        owner_id: "a".into(),
        date: tomorrow(),
        start_time: at(18, 0),
    };
    assert_eq!(h.service.find_by_triple(&key).unwrap().id, old.id);

    let fresh = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    assert_eq!(h.service.find_by_triple(&key).unwrap().id, fresh.id);

    let missing = TripleQuery {
        owner_id: "b".into(),
        ..key
    };
    assert!(matches!(h.service.find_by_triple(&missing), Err(ReservationError::NotFound(_))));
}

#[test]
fn sweeper_honours_retention_horizon() {
    let h = harness();
    let cancelled = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    let confirmed = h.service.reserve(request("b", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.cancel(cancelled.id).unwrap();
    h.service.confirm(confirmed.id).unwrap();

    h.clock.advance(Duration::days(2));
    assert_eq!(h.service.sweep().unwrap(), 0);
    assert!(h.service.get(cancelled.id).is_ok());

    h.clock.advance(Duration::days(2));
    assert_eq!(h.service.sweep().unwrap(), 1);
    assert!(matches!(h.service.get(cancelled.id), Err(ReservationError::NotFound(_))));
    assert!(h.service.get(confirmed.id).is_ok());
}

#[test]
fn concurrent_reserves_never_exceed_capacity() {
    let h = harness_with_tables(3);
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let service = Arc::clone(&h.service);
            thread::spawn(move || service.reserve(request(&format!("owner-{}", i), tomorrow(), at(18, 0), 2)))
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let booked = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(booked, 3);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, ReservationError::NoCapacity { .. })));

    let all = h.store.list_all().unwrap();
    assert_eq!(capacity::peak_occupancy(&all, VENUE, tomorrow()), 3);
}

#[test]
fn concurrent_duplicates_book_once() {
    let h = harness();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&h.service);
            thread::spawn(move || service.reserve(request("same", tomorrow(), at(18, 0), 1)))
        })
        .collect();

    let booked = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(booked, 1);
}

#[tokio::test]
async fn background_sweeper_runs_on_start() {
    let h = harness();
    let r = h.service.reserve(request("a", tomorrow(), at(18, 0), 1)).unwrap();
    h.service.cancel(r.id).unwrap();
    h.clock.advance(Duration::days(4));

    let task = table_reservations::sweeper::spawn_retention_sweeper(
        Arc::clone(&h.service),
        std::time::Duration::from_secs(3600),
    );
    for _ in 0..100 {
        if h.store.list_all().unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    task.abort();
    assert!(h.store.list_all().unwrap().is_empty());
}
