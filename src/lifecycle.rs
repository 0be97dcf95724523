//! Reservation lifecycle.
//!
//! ```text
//! pending   --confirm-->          confirmed
//! pending   --cancel-->           cancelled
//! confirmed --cancel-->           cancelled
//! confirmed --mark preorder-->    confirmed (+preorder)
//! cancelled --confirm-->          confirmed (reinstated, capacity permitting)
//! ```
//!
//! Transitions are pure: each one inspects the current record and returns the
//! patch to persist. Capacity re-checks for reinstatement belong to the
//! service, which holds the venue lock.

use chrono::{DateTime, Utc};

use crate::errors::{ReservationError, Result};
use crate::models::{Reservation, ReservationPatch, ReservationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Confirm,
    Cancel,
    MarkPreorder,
    RemovePreorder,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Confirm => "confirm",
            Transition::Cancel => "cancel",
            Transition::MarkPreorder => "mark preorder on",
            Transition::RemovePreorder => "remove preorder from",
        }
    }

    pub fn apply(self, current: &Reservation, now: DateTime<Utc>) -> Result<ReservationPatch> {
        match self {
            Transition::Confirm => Ok(confirm(current, now)),
            Transition::Cancel => Ok(cancel(current, now)),
            Transition::MarkPreorder => mark_preorder(current, now),
            Transition::RemovePreorder => Ok(remove_preorder(current)),
        }
    }
}

/// A cancelled reservation no longer holds a table; confirming it again
/// needs a fresh capacity check.
pub fn requires_reinstatement(current: &Reservation) -> bool {
    current.status == ReservationStatus::Cancelled
}

pub fn confirm(current: &Reservation, now: DateTime<Utc>) -> ReservationPatch {
    let mut patch = ReservationPatch {
        status: Some(ReservationStatus::Confirmed),
        confirmed_at: Some(Some(now)),
        ..Default::default()
    };
    if requires_reinstatement(current) {
        patch.cancelled_at = Some(None);
    }
    patch
}

/// Re-cancelling keeps the original `cancelled_at`.
pub fn cancel(current: &Reservation, now: DateTime<Utc>) -> ReservationPatch {
    if current.status == ReservationStatus::Cancelled {
        return ReservationPatch::default();
    }
    ReservationPatch {
        status: Some(ReservationStatus::Cancelled),
        cancelled_at: Some(Some(now)),
        has_preorder: Some(false),
        preorder_marked_at: Some(None),
        ..Default::default()
    }
}

pub fn mark_preorder(current: &Reservation, now: DateTime<Utc>) -> Result<ReservationPatch> {
    if current.status != ReservationStatus::Confirmed {
        return Err(ReservationError::InvalidState {
            id: current.id,
            status: current.status,
            operation: Transition::MarkPreorder.name(),
        });
    }
    Ok(ReservationPatch {
        has_preorder: Some(true),
        preorder_marked_at: Some(Some(now)),
        ..Default::default()
    })
}

pub fn remove_preorder(_current: &Reservation) -> ReservationPatch {
    ReservationPatch {
        has_preorder: Some(false),
        preorder_marked_at: Some(None),
        ..Default::default()
    }
}

/// Field-level invariants every persisted reservation must satisfy.
pub fn is_consistent(r: &Reservation) -> bool {
    let cancelled = r.status == ReservationStatus::Cancelled;
    let cancel_stamp_matches = cancelled == r.cancelled_at.is_some();
    let confirmed_was_stamped = r.status != ReservationStatus::Confirmed || r.confirmed_at.is_some();
    let preorder_only_when_confirmed = !r.has_preorder || r.status == ReservationStatus::Confirmed;
    let preorder_stamp_matches = r.has_preorder == r.preorder_marked_at.is_some();
    cancel_stamp_matches && confirmed_was_stamped && preorder_only_when_confirmed && preorder_stamp_matches
}
