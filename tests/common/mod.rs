#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use table_reservations::capacity::{Venue, VenueTable};
use table_reservations::clock::FixedClock;
use table_reservations::config::BookingRules;
use table_reservations::models::{ReservationRequest, SlotQuery};
use table_reservations::queue::LogNotifier;
use table_reservations::service::ReservationService;
use table_reservations::store::MemoryReservationStore;

pub const VENUE: i32 = 1;
pub const TABLES: u32 = 5;

/// 2025-06-10 14:05 at the venue (UTC+3).
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 11, 5, 0).unwrap()
}

pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
}

pub fn tomorrow() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 11).unwrap()
}

pub fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub struct Harness {
    pub service: Arc<ReservationService>,
    pub clock: Arc<FixedClock>,
    pub store: Arc<MemoryReservationStore>,
}

pub fn harness() -> Harness {
    harness_with_tables(TABLES)
}

pub fn harness_with_tables(tables: u32) -> Harness {
    let clock = Arc::new(FixedClock::new(now()));
    let store = Arc::new(MemoryReservationStore::new());
    let venues = VenueTable::new(vec![
        Venue {
            id: VENUE,
            address: "Pobediteley Ave 85".into(),
            tables,
        },
        Venue {
            id: 2,
            address: "Dzerzhinskogo Ave 9".into(),
            tables,
        },
    ]);
    let service = Arc::new(ReservationService::new(
        store.clone(),
        venues,
        BookingRules::default(),
        clock.clone(),
        Arc::new(LogNotifier),
    ));
    Harness { service, clock, store }
}

pub fn request(owner: &str, date: NaiveDate, start: NaiveTime, hours: i32) -> ReservationRequest {
    ReservationRequest {
        venue_id: VENUE,
        date,
        start_time: start,
        duration_hours: hours,
        customer_name: format!("Guest {}", owner),
        customer_phone: "+375291234567".into(),
        owner_id: owner.into(),
    }
}

pub fn slot(date: NaiveDate, start: NaiveTime, hours: i32) -> SlotQuery {
    SlotQuery {
        venue_id: VENUE,
        date,
        start_time: start,
        duration_hours: hours,
    }
}
