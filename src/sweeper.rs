use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::errors::{ReservationError, Result};
use crate::models::{Reservation, ReservationStatus};
use crate::service::ReservationService;
use crate::store::ReservationStore;

/// A horizon that cannot be represented lies before every record.
pub fn is_expired(reservation: &Reservation, now: DateTime<Utc>, retention_days: i64) -> bool {
    let Some(horizon) = Duration::try_days(retention_days).and_then(|d| now.checked_sub_signed(d)) else {
        return false;
    };
    reservation.status == ReservationStatus::Cancelled
        && reservation.cancelled_at.is_some_and(|at| at <= horizon)
}

/// Deletes cancelled reservations whose cancellation is at least
/// `retention_days` old. Keys are collected before anything is deleted.
pub fn sweep(store: &dyn ReservationStore, now: DateTime<Utc>, retention_days: i64) -> Result<usize> {
    let expired: Vec<Uuid> = store
        .list_all()?
        .iter()
        .filter(|r| is_expired(r, now, retention_days))
        .map(|r| r.id)
        .collect();

    let mut deleted = 0;
    for id in expired {
        match store.delete(id) {
            Ok(()) => deleted += 1,
            Err(ReservationError::NotFound(_)) => debug!("Reservation {} already gone before sweep", id),
            Err(e) => return Err(e),
        }
    }

    if deleted > 0 {
        info!("Deleted {} cancelled reservations older than {} days", deleted, retention_days);
    }
    Ok(deleted)
}

/// Runs the sweep on a fixed interval. The first run happens immediately.
pub fn spawn_retention_sweeper(service: Arc<ReservationService>, every: StdDuration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let service = Arc::clone(&service);
            match tokio::task::spawn_blocking(move || service.sweep()).await {
                Ok(Ok(count)) => debug!("Retention sweep finished, {} deleted", count),
                Ok(Err(e)) => error!("Retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep task panicked: {:?}", e),
            }
        }
    })
}
