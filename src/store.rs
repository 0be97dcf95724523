use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, NaiveTime};
use uuid::Uuid;

use crate::errors::{ReservationError, Result};
use crate::models::{NewReservation, Reservation, ReservationPatch};

/// What the booking core needs from persistence.
pub trait ReservationStore: Send + Sync {
    fn list_all(&self) -> Result<Vec<Reservation>>;

    fn list_for_venue_date(&self, venue_id: i32, date: NaiveDate) -> Result<Vec<Reservation>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|r| r.venue_id == venue_id && r.date == date)
            .collect())
    }

    fn get(&self, id: Uuid) -> Result<Reservation>;

    /// With `include_cancelled` an active match still wins over cancelled
    /// ones; among cancelled matches the most recently created is returned.
    fn find_by_triple(
        &self,
        owner_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        include_cancelled: bool,
    ) -> Result<Option<Reservation>>;

    /// Fails with `DuplicateBooking` if an active reservation already holds
    /// the same owner/date/start.
    fn create(&self, new: NewReservation) -> Result<Reservation>;

    /// Fails with `DuplicateBooking`, leaving the record untouched, if the
    /// patch would leave it active alongside another active reservation
    /// with the same owner/date/start.
    fn update_fields(&self, id: Uuid, patch: &ReservationPatch) -> Result<Reservation>;

    fn delete(&self, id: Uuid) -> Result<()>;
}

pub(crate) fn pick_triple_match<I>(matches: I, include_cancelled: bool) -> Option<Reservation>
where
    I: IntoIterator<Item = Reservation>,
{
    matches
        .into_iter()
        .filter(|r| include_cancelled || r.is_active())
        .max_by_key(|r| (r.is_active(), r.created_at))
}

#[derive(Debug, Default)]
pub struct MemoryReservationStore {
    records: RwLock<HashMap<Uuid, Reservation>>,
}

impl MemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, Reservation>>> {
        self.records
            .read()
            .map_err(|_| ReservationError::StorageUnavailable("reservation map lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, Reservation>>> {
        self.records
            .write()
            .map_err(|_| ReservationError::StorageUnavailable("reservation map lock poisoned".into()))
    }
}

impl ReservationStore for MemoryReservationStore {
    fn list_all(&self) -> Result<Vec<Reservation>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn list_for_venue_date(&self, venue_id: i32, date: NaiveDate) -> Result<Vec<Reservation>> {
        Ok(self
            .read()?
            .values()
            .filter(|r| r.venue_id == venue_id && r.date == date)
            .cloned()
            .collect())
    }

    fn get(&self, id: Uuid) -> Result<Reservation> {
        self.read()?
            .get(&id)
            .cloned()
            .ok_or_else(|| ReservationError::not_found(id))
    }

    fn find_by_triple(
        &self,
        owner_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        include_cancelled: bool,
    ) -> Result<Option<Reservation>> {
        let records = self.read()?;
        let matches = records
            .values()
            .filter(|r| r.matches_triple(owner_id, date, start_time))
            .cloned();
        Ok(pick_triple_match(matches, include_cancelled))
    }

    fn create(&self, new: NewReservation) -> Result<Reservation> {
        let mut records = self.write()?;
        let duplicate = records
            .values()
            .any(|r| r.is_active() && r.matches_triple(&new.owner_id, new.date, new.start_time));
        if duplicate {
            return Err(ReservationError::DuplicateBooking {
                owner_id: new.owner_id,
                date: new.date,
                start_time: new.start_time,
            });
        }
        let reservation = new.into_reservation();
        records.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    fn update_fields(&self, id: Uuid, patch: &ReservationPatch) -> Result<Reservation> {
        let mut records = self.write()?;
        let mut updated = records.get(&id).cloned().ok_or_else(|| ReservationError::not_found(id))?;
        patch.apply_to(&mut updated);

        let duplicate = updated.is_active()
            && records.values().any(|r| {
                r.id != id && r.is_active() && r.matches_triple(&updated.owner_id, updated.date, updated.start_time)
            });
        if duplicate {
            return Err(ReservationError::DuplicateBooking {
                owner_id: updated.owner_id,
                date: updated.date,
                start_time: updated.start_time,
            });
        }
        records.insert(id, updated.clone());
        Ok(updated)
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        self.write()?
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ReservationError::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReservationStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn new_reservation(owner: &str, hour: u32) -> NewReservation {
        NewReservation {
            id: Uuid::new_v4(),
            venue_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            duration_hours: 1,
            customer_name: "Olga".into(),
            customer_phone: "+375441234567".into(),
            owner_id: owner.into(),
            status: ReservationStatus::Pending,
            has_preorder: false,
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        }
    }

    fn cancelled_patch() -> ReservationPatch {
        ReservationPatch {
            status: Some(ReservationStatus::Cancelled),
            cancelled_at: Some(Some(Utc::now())),
            ..Default::default()
        }
    }

    #[test]
    fn create_get_update_delete() {
        let store = MemoryReservationStore::new();
        let created = store.create(new_reservation("1", 12)).unwrap();
        assert_eq!(store.get(created.id).unwrap(), created);

        let updated = store.update_fields(created.id, &cancelled_patch()).unwrap();
        assert_eq!(updated.status, ReservationStatus::Cancelled);

        store.delete(created.id).unwrap();
        assert!(matches!(store.get(created.id), Err(ReservationError::NotFound(_))));
        assert!(matches!(store.delete(created.id), Err(ReservationError::NotFound(_))));
        assert!(matches!(
            store.update_fields(created.id, &cancelled_patch()),
            Err(ReservationError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_active_triple_is_refused() {
        let store = MemoryReservationStore::new();
        let first = store.create(new_reservation("1", 12)).unwrap();
        assert!(matches!(
            store.create(new_reservation("1", 12)),
            Err(ReservationError::DuplicateBooking { .. })
        ));

        store.update_fields(first.id, &cancelled_patch()).unwrap();
        assert!(store.create(new_reservation("1", 12)).is_ok());
    }

    #[test]
    fn reactivating_onto_an_active_triple_is_refused() {
        let store = MemoryReservationStore::new();
        let old = store.create(new_reservation("1", 12)).unwrap();
        store.update_fields(old.id, &cancelled_patch()).unwrap();
        let rebooked = store.create(new_reservation("1", 12)).unwrap();

        let reinstate = ReservationPatch {
            status: Some(ReservationStatus::Confirmed),
            confirmed_at: Some(Some(Utc::now())),
            cancelled_at: Some(None),
            ..Default::default()
        };
        assert!(matches!(
            store.update_fields(old.id, &reinstate),
            Err(ReservationError::DuplicateBooking { .. })
        ));
        assert_eq!(store.get(old.id).unwrap().status, ReservationStatus::Cancelled);

        // the active record itself may still change
        assert_eq!(
            store.update_fields(rebooked.id, &reinstate).unwrap().status,
            ReservationStatus::Confirmed
        );
    }

    #[test]
    fn triple_lookup_prefers_active_record() {
        let store = MemoryReservationStore::new();
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        let time = NaiveTime::from_hms_opt(12, 0, 0).unwrap();

        let old = store.create(new_reservation("1", 12)).unwrap();
        store.update_fields(old.id, &cancelled_patch()).unwrap();
        assert!(store.find_by_triple("1", date, time, false).unwrap().is_none());
        assert_eq!(store.find_by_triple("1", date, time, true).unwrap().unwrap().id, old.id);

        let mut again = new_reservation("1", 12);
        again.created_at = again.created_at - Duration::days(1);
        let active = store.create(again).unwrap();
        assert_eq!(store.find_by_triple("1", date, time, true).unwrap().unwrap().id, active.id);
        assert_eq!(store.find_by_triple("1", date, time, false).unwrap().unwrap().id, active.id);
    }

    #[test]
    fn venue_date_listing_filters() {
        let store = MemoryReservationStore::new();
        store.create(new_reservation("1", 12)).unwrap();
        let mut elsewhere = new_reservation("2", 12);
        elsewhere.venue_id = 2;
        store.create(elsewhere).unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
        assert_eq!(store.list_for_venue_date(1, date).unwrap().len(), 1);
        assert_eq!(store.list_all().unwrap().len(), 2);
    }
}
