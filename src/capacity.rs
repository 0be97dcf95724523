use chrono::NaiveDate;
use serde::Serialize;

use crate::errors::{ReservationError, Result};
use crate::models::Reservation;
use crate::window::TimeWindow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Venue {
    pub id: i32,
    pub address: String,
    pub tables: u32,
}

/// The static set of venues a deployment serves.
#[derive(Debug, Clone, Default)]
pub struct VenueTable {
    venues: Vec<Venue>,
}

impl VenueTable {
    pub fn new(venues: Vec<Venue>) -> Self {
        Self { venues }
    }

    pub fn get(&self, venue_id: i32) -> Option<&Venue> {
        self.venues.iter().find(|v| v.id == venue_id)
    }

    pub fn require(&self, venue_id: i32) -> Result<&Venue> {
        self.get(venue_id)
            .ok_or_else(|| ReservationError::InvalidInput(format!("unknown venue {}", venue_id)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Venue> {
        self.venues.iter()
    }
}

fn holds_table_at(reservation: &Reservation, venue_id: i32, date: NaiveDate) -> bool {
    reservation.venue_id == venue_id && reservation.date == date && reservation.is_active()
}

/// Number of active reservations at the venue whose interval overlaps `window`.
pub fn occupied_tables<'a, I>(reservations: I, venue_id: i32, date: NaiveDate, window: &TimeWindow) -> u32
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let count = reservations
        .into_iter()
        .filter(|r| holds_table_at(r, venue_id, date))
        .filter(|r| r.window().overlaps(window))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

pub fn free_capacity(venue: &Venue, reservations: &[Reservation], date: NaiveDate, window: &TimeWindow) -> u32 {
    venue
        .tables
        .saturating_sub(occupied_tables(reservations, venue.id, date, window))
}

pub fn is_slot_available(venue: &Venue, reservations: &[Reservation], date: NaiveDate, window: &TimeWindow) -> bool {
    free_capacity(venue, reservations, date, window) > 0
}

/// Highest number of active reservations covering any single instant of the
/// day. Occupancy only changes at interval starts, so those are the only
/// instants worth sampling.
pub fn peak_occupancy(reservations: &[Reservation], venue_id: i32, date: NaiveDate) -> u32 {
    let active: Vec<TimeWindow> = reservations
        .iter()
        .filter(|r| holds_table_at(r, venue_id, date))
        .map(Reservation::window)
        .collect();

    active
        .iter()
        .map(|probe| {
            let at = probe.start_minute();
            u32::try_from(active.iter().filter(|w| w.covers(at)).count()).unwrap_or(u32::MAX)
        })
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewReservation, ReservationStatus};
    use chrono::{NaiveTime, Utc};
    use uuid::Uuid;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 12).unwrap()
    }

    fn booking(venue_id: i32, hour: u32, hours: i32, status: ReservationStatus) -> Reservation {
        let mut r = NewReservation {
            id: Uuid::new_v4(),
            venue_id,
            date: day(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            duration_hours: hours,
            customer_name: "Guest".into(),
            customer_phone: "+375291111111".into(),
            owner_id: Uuid::new_v4().to_string(),
            status: ReservationStatus::Pending,
            has_preorder: false,
            created_at: Utc::now(),
        }
        .into_reservation();
        r.status = status;
        r
    }

    fn venue(tables: u32) -> Venue {
        Venue { id: 1, address: "Pobediteley Ave 85".into(), tables }
    }

    fn window(hour: u32, hours: u32) -> TimeWindow {
        TimeWindow::starting_at(NaiveTime::from_hms_opt(hour, 0, 0).unwrap(), hours)
    }

    #[test]
    fn full_slot_rejects_overlap_but_not_adjacent() {
        let existing: Vec<_> = (0..5).map(|_| booking(1, 18, 2, ReservationStatus::Pending)).collect();
        let v = venue(5);
        assert_eq!(free_capacity(&v, &existing, day(), &window(19, 1)), 0);
        assert!(!is_slot_available(&v, &existing, day(), &window(19, 1)));
        assert_eq!(free_capacity(&v, &existing, day(), &window(20, 1)), 5);
    }

    #[test]
    fn cancelled_other_venues_and_other_days_do_not_count() {
        let mut other_day = booking(1, 18, 2, ReservationStatus::Confirmed);
        other_day.date = day().succ_opt().unwrap();
        let existing = vec![
            booking(1, 18, 2, ReservationStatus::Cancelled),
            booking(2, 18, 2, ReservationStatus::Confirmed),
            other_day,
            booking(1, 18, 1, ReservationStatus::Confirmed),
        ];
        assert_eq!(occupied_tables(&existing, 1, day(), &window(18, 2)), 1);
        assert_eq!(free_capacity(&venue(2), &existing, day(), &window(18, 2)), 1);
    }

    #[test]
    fn free_capacity_saturates() {
        let existing: Vec<_> = (0..4).map(|_| booking(1, 12, 1, ReservationStatus::Confirmed)).collect();
        assert_eq!(free_capacity(&venue(2), &existing, day(), &window(12, 1)), 0);
    }

    #[test]
    fn peak_counts_simultaneous_bookings_only() {
        let existing = vec![
            booking(1, 10, 2, ReservationStatus::Pending),
            booking(1, 11, 2, ReservationStatus::Confirmed),
            booking(1, 12, 1, ReservationStatus::Pending),
            booking(1, 11, 1, ReservationStatus::Cancelled),
        ];
        assert_eq!(peak_occupancy(&existing, 1, day()), 2);
        assert_eq!(peak_occupancy(&[], 1, day()), 0);
    }

    #[test]
    fn unknown_venue_is_invalid_input() {
        let table = VenueTable::new(vec![venue(5)]);
        assert!(table.require(1).is_ok());
        assert!(matches!(table.require(9), Err(ReservationError::InvalidInput(_))));
    }
}
