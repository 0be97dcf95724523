use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ReservationStatus;

pub type Result<T> = std::result::Result<T, ReservationError>;

#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("venue closes at {closing_time}: a {duration_hours}h booking starting at {start_time} runs past closing")]
    OutOfHours {
        start_time: NaiveTime,
        duration_hours: i32,
        closing_time: NaiveTime,
    },

    #[error("too close to the current time: bookings on {date} must start after {earliest}, requested {start_time}")]
    TooSoon {
        date: NaiveDate,
        start_time: NaiveTime,
        earliest: NaiveDateTime,
    },

    #[error("no free tables at venue {venue_id} on {date} from {start_time} for {duration_hours}h")]
    NoCapacity {
        venue_id: i32,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_hours: i32,
    },

    #[error("owner {owner_id} already has an active reservation on {date} at {start_time}")]
    DuplicateBooking {
        owner_id: String,
        date: NaiveDate,
        start_time: NaiveTime,
    },

    #[error("cannot {operation} reservation {id} while it is {status}")]
    InvalidState {
        id: Uuid,
        status: ReservationStatus,
        operation: &'static str,
    },

    #[error("reservation not found: {0}")]
    NotFound(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ReservationError {
    pub fn not_found(id: Uuid) -> Self {
        ReservationError::NotFound(id.to_string())
    }

    /// Business-rule rejections are reported to the caller verbatim and are
    /// never treated as system failures.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, ReservationError::StorageUnavailable(_))
    }
}

impl From<diesel::result::Error> for ReservationError {
    fn from(e: diesel::result::Error) -> Self {
        ReservationError::StorageUnavailable(e.to_string())
    }
}

impl From<r2d2::Error> for ReservationError {
    fn from(e: r2d2::Error) -> Self {
        ReservationError::StorageUnavailable(format!("connection pool: {}", e))
    }
}
