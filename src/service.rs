use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{Days, NaiveDate, Timelike};
use log::{debug, info};
use regex::Regex;
use uuid::Uuid;

use crate::capacity::{self, VenueTable};
use crate::clock::Clock;
use crate::config::BookingRules;
use crate::errors::{ReservationError, Result};
use crate::lifecycle::{self, Transition};
use crate::models::{
    AvailabilityReport, NewReservation, OldReservation, Reservation, ReservationRequest, ReservationStatistics,
    ReservationStatus, SlotQuery, TripleQuery, UnavailableReason,
};
use crate::queue::{self, Notifier};
use crate::store::ReservationStore;
use crate::sweeper;
use crate::window::{self, TimeWindow};

const PHONE_PATTERN: &str = r"^\+?[0-9]{10,15}$";
const DAYS_PER_MONTH: u64 = 30;

fn phone_regex() -> Result<&'static Regex> {
    static PHONE: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PHONE
        .get_or_init(|| Regex::new(PHONE_PATTERN))
        .as_ref()
        .map_err(|e| ReservationError::InvalidInput(format!("phone pattern: {}", e)))
}

/// Strips common separators and checks what is left looks like a phone number.
pub fn normalize_phone(raw: &str) -> Result<String> {
    let normalized: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if phone_regex()?.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ReservationError::InvalidInput(format!("invalid phone number: {}", raw)))
    }
}

fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ReservationError::InvalidInput(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

/// Books tables and drives reservations through their lifecycle.
///
/// Every write that can change a venue's occupancy holds that venue's lock
/// from the capacity read through the store write, so concurrent requests
/// cannot both take the last table.
pub struct ReservationService {
    store: Arc<dyn ReservationStore>,
    venues: VenueTable,
    rules: BookingRules,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    venue_locks: Mutex<HashMap<i32, Arc<Mutex<()>>>>,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        venues: VenueTable,
        rules: BookingRules,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            venues,
            rules,
            clock,
            notifier,
            venue_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn venues(&self) -> &VenueTable {
        &self.venues
    }

    fn venue_lock(&self, venue_id: i32) -> Arc<Mutex<()>> {
        let mut locks = self.venue_locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(venue_id).or_default())
    }

    /// Business-hour and buffer checks shared by the check and booking paths.
    fn validate_slot(&self, slot: &SlotQuery) -> Result<TimeWindow> {
        self.venues.require(slot.venue_id)?;
        if slot.start_time.second() != 0 || slot.start_time.nanosecond() != 0 {
            return Err(ReservationError::InvalidInput(format!(
                "start time {} must be on a whole minute",
                slot.start_time
            )));
        }

        let window = window::compute_end_time(slot.start_time, slot.duration_hours)?;
        if !window::is_within_business_hours(&window, self.rules.closing_time) {
            return Err(ReservationError::OutOfHours {
                start_time: slot.start_time,
                duration_hours: slot.duration_hours,
                closing_time: self.rules.closing_time,
            });
        }

        let now = self.clock.now();
        if window::is_too_soon(now, self.rules.utc_offset, slot.date, slot.start_time, self.rules.buffer_minutes) {
            return Err(ReservationError::TooSoon {
                date: slot.date,
                start_time: slot.start_time,
                earliest: window::earliest_same_day_start(now, self.rules.utc_offset, self.rules.buffer_minutes),
            });
        }
        Ok(window)
    }

    fn free_tables(&self, slot: &SlotQuery, window: &TimeWindow) -> Result<u32> {
        let venue = self.venues.require(slot.venue_id)?;
        let existing = self.store.list_for_venue_date(slot.venue_id, slot.date)?;
        Ok(capacity::free_capacity(venue, &existing, slot.date, window))
    }

    /// Read-only availability check. Rule violations come back as a reason
    /// with `free = 0`; only storage failures are errors.
    pub fn check_availability(&self, slot: &SlotQuery) -> Result<AvailabilityReport> {
        let window = match self.validate_slot(slot) {
            Ok(window) => window,
            Err(e) => {
                let reason = match e {
                    ReservationError::OutOfHours { .. } => UnavailableReason::ClosingTime,
                    ReservationError::TooSoon { .. } => UnavailableReason::TimePassed,
                    ReservationError::InvalidInput(_) => UnavailableReason::InvalidInput,
                    other => return Err(other),
                };
                debug!("Slot {:?} unavailable: {}", slot, reason_text(reason));
                return Ok(AvailabilityReport::unavailable(reason));
            }
        };
        Ok(AvailabilityReport::free(self.free_tables(slot, &window)?))
    }

    pub fn reserve(&self, request: ReservationRequest) -> Result<Reservation> {
        let result = self.try_reserve(request);
        if let Err(e) = &result {
            if e.is_rejection() {
                debug!("Reservation rejected: {}", e);
            }
        }
        result
    }

    fn try_reserve(&self, request: ReservationRequest) -> Result<Reservation> {
        let customer_name = required_text("customer name", &request.customer_name)?;
        let owner_id = required_text("owner id", &request.owner_id)?;
        let customer_phone = normalize_phone(&request.customer_phone)?;
        let slot = request.slot();
        let window = self.validate_slot(&slot)?;

        let lock = self.venue_lock(slot.venue_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        if self
            .store
            .find_by_triple(&owner_id, slot.date, slot.start_time, false)?
            .is_some()
        {
            return Err(ReservationError::DuplicateBooking {
                owner_id,
                date: slot.date,
                start_time: slot.start_time,
            });
        }

        if self.free_tables(&slot, &window)? == 0 {
            return Err(ReservationError::NoCapacity {
                venue_id: slot.venue_id,
                date: slot.date,
                start_time: slot.start_time,
                duration_hours: slot.duration_hours,
            });
        }

        let reservation = self.store.create(NewReservation {
            id: Uuid::new_v4(),
            venue_id: slot.venue_id,
            date: slot.date,
            start_time: slot.start_time,
            duration_hours: slot.duration_hours,
            customer_name,
            customer_phone,
            owner_id,
            status: ReservationStatus::Pending,
            has_preorder: false,
            created_at: self.clock.now(),
        })?;

        info!(
            "Reservation {} created: venue {} on {} at {} for {}h",
            reservation.id,
            reservation.venue_id,
            reservation.date,
            reservation.start_time.format("%H:%M"),
            reservation.duration_hours
        );
        queue::notify_in_background(Arc::clone(&self.notifier), &reservation);
        Ok(reservation)
    }

    pub fn get(&self, id: Uuid) -> Result<Reservation> {
        self.store.get(id)
    }

    /// Resolves the natural `(owner, date, start)` key to a reservation,
    /// preferring an active one over cancelled history.
    pub fn find_by_triple(&self, key: &TripleQuery) -> Result<Reservation> {
        self.store
            .find_by_triple(&key.owner_id, key.date, key.start_time, true)?
            .ok_or_else(|| {
                ReservationError::NotFound(format!(
                    "owner {} on {} at {}",
                    key.owner_id,
                    key.date,
                    key.start_time.format("%H:%M")
                ))
            })
    }

    pub fn confirm(&self, id: Uuid) -> Result<Reservation> {
        self.transition(id, Transition::Confirm)
    }

    pub fn cancel(&self, id: Uuid) -> Result<Reservation> {
        self.transition(id, Transition::Cancel)
    }

    pub fn mark_preorder(&self, id: Uuid) -> Result<Reservation> {
        self.transition(id, Transition::MarkPreorder)
    }

    pub fn remove_preorder(&self, id: Uuid) -> Result<Reservation> {
        self.transition(id, Transition::RemovePreorder)
    }

    fn transition(&self, id: Uuid, transition: Transition) -> Result<Reservation> {
        let venue_id = self.store.get(id)?.venue_id;
        let lock = self.venue_lock(venue_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        // re-read under the lock
        let current = self.store.get(id)?;
        if transition == Transition::Confirm && lifecycle::requires_reinstatement(&current) {
            self.ensure_reinstatable(&current)?;
        }

        let patch = transition.apply(&current, self.clock.now())?;
        if patch.is_empty() {
            debug!("{} on reservation {} changed nothing", transition.name(), id);
            return Ok(current);
        }
        let updated = self.store.update_fields(id, &patch)?;
        debug_assert!(lifecycle::is_consistent(&updated));
        info!("Reservation {} is now {} (after {})", id, updated.status, transition.name());
        Ok(updated)
    }

    /// A cancelled record does not hold a table, so bringing it back needs
    /// the same capacity and duplicate guarantees as a fresh booking.
    fn ensure_reinstatable(&self, current: &Reservation) -> Result<()> {
        if let Some(active) = self
            .store
            .find_by_triple(&current.owner_id, current.date, current.start_time, false)?
        {
            if active.id != current.id {
                return Err(ReservationError::DuplicateBooking {
                    owner_id: current.owner_id.clone(),
                    date: current.date,
                    start_time: current.start_time,
                });
            }
        }

        let venue = self.venues.require(current.venue_id)?;
        let existing = self.store.list_for_venue_date(current.venue_id, current.date)?;
        if !capacity::is_slot_available(venue, &existing, current.date, &current.window()) {
            return Err(ReservationError::NoCapacity {
                venue_id: current.venue_id,
                date: current.date,
                start_time: current.start_time,
                duration_hours: current.duration_hours,
            });
        }
        Ok(())
    }

    /// Administrative hard delete, bypassing the lifecycle.
    pub fn delete(&self, id: Uuid) -> Result<()> {
        let venue_id = self.store.get(id)?.venue_id;
        let lock = self.venue_lock(venue_id);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());
        self.store.delete(id)?;
        info!("Reservation {} deleted", id);
        Ok(())
    }

    pub fn list_all(&self) -> Result<Vec<Reservation>> {
        let mut all = self.store.list_all()?;
        sort_by_slot(&mut all);
        Ok(all)
    }

    pub fn list_by_date(&self, date: NaiveDate) -> Result<Vec<Reservation>> {
        let mut found: Vec<_> = self.store.list_all()?.into_iter().filter(|r| r.date == date).collect();
        sort_by_slot(&mut found);
        Ok(found)
    }

    pub fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Reservation>> {
        let mut found: Vec<_> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|r| r.owner_id == owner_id)
            .collect();
        sort_by_slot(&mut found);
        Ok(found)
    }

    pub fn statistics(&self) -> Result<ReservationStatistics> {
        let mut stats = ReservationStatistics::default();
        for r in self.store.list_all()? {
            stats.total += 1;
            match r.status {
                ReservationStatus::Pending => stats.pending += 1,
                ReservationStatus::Confirmed => stats.confirmed += 1,
                ReservationStatus::Cancelled => stats.cancelled += 1,
            }
            if r.has_preorder {
                stats.with_preorder += 1;
            }
        }
        Ok(stats)
    }

    /// Reservations dated more than `months_back` thirty-day months before
    /// the venue-local today, oldest first.
    pub fn old_reservations(&self, months_back: u32) -> Result<Vec<OldReservation>> {
        let today = window::venue_now(self.clock.now(), self.rules.utc_offset).date();
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(months_back) * DAYS_PER_MONTH))
            .unwrap_or(NaiveDate::MIN);

        let mut old: Vec<_> = self.store.list_all()?.into_iter().filter(|r| r.date < cutoff).collect();
        sort_by_slot(&mut old);
        Ok(old
            .into_iter()
            .map(|reservation| OldReservation {
                days_ago: (today - reservation.date).num_days(),
                reservation,
            })
            .collect())
    }

    /// Purges cancelled reservations older than the retention horizon.
    pub fn sweep(&self) -> Result<usize> {
        sweeper::sweep(self.store.as_ref(), self.clock.now(), self.rules.retention_days)
    }
}

fn reason_text(reason: UnavailableReason) -> &'static str {
    match reason {
        UnavailableReason::InvalidInput => "invalid input",
        UnavailableReason::ClosingTime => "runs past closing time",
        UnavailableReason::TimePassed => "too close to now",
        UnavailableReason::NoCapacity => "no free tables",
    }
}

fn sort_by_slot(reservations: &mut [Reservation]) {
    reservations.sort_by(|a, b| {
        (a.date, a.start_time, a.venue_id, a.created_at).cmp(&(b.date, b.start_time, b.venue_id, b.created_at))
    });
}
