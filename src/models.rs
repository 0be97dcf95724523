use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::{
    deserialize::{self, FromSql},
    pg::{Pg, PgValue},
    serialize::{self, Output, ToSql},
    sql_types::Text,
    AsChangeset, Insertable, Selectable,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::reservations;
use crate::window::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = crate::schema::sql_types::ReservationStatus)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    /// Pending and confirmed reservations both hold a table.
    pub fn is_active(self) -> bool {
        !matches!(self, ReservationStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql<crate::schema::sql_types::ReservationStatus, Pg> for ReservationStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let s = match *self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        };
        <str as ToSql<Text, Pg>>::to_sql(s, out)
    }
}

impl FromSql<crate::schema::sql_types::ReservationStatus, Pg> for ReservationStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        match <String as FromSql<Text, Pg>>::from_sql(bytes)?.as_str() {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            s => Err(format!("Unrecognized reservation status: {}", s).into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize)]
#[diesel(table_name = reservations)]
pub struct Reservation {
    pub id: Uuid,
    pub venue_id: i32,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    pub duration_hours: i32,
    pub customer_name: String,
    pub customer_phone: String,
    pub owner_id: String,
    pub status: ReservationStatus,
    pub has_preorder: bool,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub preorder_marked_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Occupied interval in venue-local minutes. A stored non-positive
    /// duration yields an empty window that overlaps nothing.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::starting_at(self.start_time, u32::try_from(self.duration_hours).unwrap_or(0))
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn matches_triple(&self, owner_id: &str, date: NaiveDate, start_time: NaiveTime) -> bool {
        self.owner_id == owner_id && self.date == date && self.start_time == start_time
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reservations)]
pub struct NewReservation {
    pub id: Uuid,
    pub venue_id: i32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_hours: i32,
    pub customer_name: String,
    pub customer_phone: String,
    pub owner_id: String,
    pub status: ReservationStatus,
    pub has_preorder: bool,
    pub created_at: DateTime<Utc>,
}

impl NewReservation {
    pub fn into_reservation(self) -> Reservation {
        Reservation {
            id: self.id,
            venue_id: self.venue_id,
            date: self.date,
            start_time: self.start_time,
            duration_hours: self.duration_hours,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            owner_id: self.owner_id,
            status: self.status,
            has_preorder: self.has_preorder,
            created_at: self.created_at,
            confirmed_at: None,
            cancelled_at: None,
            preorder_marked_at: None,
        }
    }
}

/// Partial update of lifecycle fields. `None` leaves a column untouched,
/// `Some(None)` clears a nullable timestamp.
#[derive(Debug, Clone, Default, PartialEq, AsChangeset)]
#[diesel(table_name = reservations)]
pub struct ReservationPatch {
    pub status: Option<ReservationStatus>,
    pub has_preorder: Option<bool>,
    pub confirmed_at: Option<Option<DateTime<Utc>>>,
    pub cancelled_at: Option<Option<DateTime<Utc>>>,
    pub preorder_marked_at: Option<Option<DateTime<Utc>>>,
}

impl ReservationPatch {
    pub fn is_empty(&self) -> bool {
        *self == ReservationPatch::default()
    }

    pub fn apply_to(&self, reservation: &mut Reservation) {
        if let Some(status) = self.status {
            reservation.status = status;
        }
        if let Some(flag) = self.has_preorder {
            reservation.has_preorder = flag;
        }
        if let Some(at) = self.confirmed_at {
            reservation.confirmed_at = at;
        }
        if let Some(at) = self.cancelled_at {
            reservation.cancelled_at = at;
        }
        if let Some(at) = self.preorder_marked_at {
            reservation.preorder_marked_at = at;
        }
    }
}

// Request/Response models for API

fn default_duration() -> i32 {
    1
}

/// A (venue, date, start, duration) tuple being checked.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlotQuery {
    #[serde(alias = "place")]
    pub venue_id: i32,
    pub date: NaiveDate,
    #[serde(with = "hhmm", alias = "time")]
    pub start_time: NaiveTime,
    #[serde(default = "default_duration", alias = "duration")]
    pub duration_hours: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationRequest {
    #[serde(alias = "place")]
    pub venue_id: i32,
    pub date: NaiveDate,
    #[serde(with = "hhmm", alias = "time")]
    pub start_time: NaiveTime,
    #[serde(alias = "duration")]
    pub duration_hours: i32,
    #[serde(alias = "name")]
    pub customer_name: String,
    #[serde(alias = "phone")]
    pub customer_phone: String,
    #[serde(alias = "user_id")]
    pub owner_id: String,
}

impl ReservationRequest {
    pub fn slot(&self) -> SlotQuery {
        SlotQuery {
            venue_id: self.venue_id,
            date: self.date,
            start_time: self.start_time,
            duration_hours: self.duration_hours,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TripleQuery {
    #[serde(alias = "user_id")]
    pub owner_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm", alias = "time")]
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    InvalidInput,
    ClosingTime,
    TimePassed,
    NoCapacity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailabilityReport {
    pub free: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<UnavailableReason>,
}

impl AvailabilityReport {
    pub fn free(free: u32) -> Self {
        AvailabilityReport {
            free,
            reason: if free == 0 { Some(UnavailableReason::NoCapacity) } else { None },
        }
    }

    pub fn unavailable(reason: UnavailableReason) -> Self {
        AvailabilityReport { free: 0, reason: Some(reason) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReservationStatistics {
    pub total: usize,
    pub pending: usize,
    pub confirmed: usize,
    pub cancelled: usize,
    pub with_preorder: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct OldReservation {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub days_ago: i64,
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub deleted_count: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub message: String,
}

/// Venue-local wall-clock times travel as `HH:MM`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}
