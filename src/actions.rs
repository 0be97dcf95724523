use chrono::{NaiveDate, NaiveTime};
use diesel::prelude::*;
use diesel::r2d2::{self, ConnectionManager};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use crate::errors::{ReservationError, Result};
use crate::models::{NewReservation, Reservation, ReservationPatch};
use crate::store::{pick_triple_match, ReservationStore};

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

pub fn initialize_db_pool(database_url: &str) -> Result<DbPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = r2d2::Pool::builder().build(manager)?;
    Ok(pool)
}

pub fn load_all_reservations(conn: &mut PgConnection) -> QueryResult<Vec<Reservation>> {
    use crate::schema::reservations::dsl::*;

    reservations
        .order((date.asc(), start_time.asc()))
        .select(Reservation::as_select())
        .load(conn)
}

pub fn load_for_venue_date(conn: &mut PgConnection, venue: i32, day: NaiveDate) -> QueryResult<Vec<Reservation>> {
    use crate::schema::reservations::dsl::*;

    reservations
        .filter(venue_id.eq(venue))
        .filter(date.eq(day))
        .select(Reservation::as_select())
        .load(conn)
}

pub fn find_reservation(conn: &mut PgConnection, reservation_id: Uuid) -> QueryResult<Option<Reservation>> {
    use crate::schema::reservations::dsl::*;

    reservations
        .find(reservation_id)
        .select(Reservation::as_select())
        .first(conn)
        .optional()
}

pub fn find_by_owner_slot(
    conn: &mut PgConnection,
    owner: &str,
    day: NaiveDate,
    start: NaiveTime,
) -> QueryResult<Vec<Reservation>> {
    use crate::schema::reservations::dsl::*;

    reservations
        .filter(owner_id.eq(owner))
        .filter(date.eq(day))
        .filter(start_time.eq(start))
        .select(Reservation::as_select())
        .load(conn)
}

pub fn insert_reservation(conn: &mut PgConnection, new: &NewReservation) -> QueryResult<Reservation> {
    use crate::schema::reservations::dsl::*;

    diesel::insert_into(reservations)
        .values(new)
        .returning(Reservation::as_returning())
        .get_result(conn)
}

pub fn update_reservation(
    conn: &mut PgConnection,
    reservation_id: Uuid,
    patch: &ReservationPatch,
) -> QueryResult<Option<Reservation>> {
    use crate::schema::reservations::dsl::*;

    // diesel refuses an UPDATE with an empty SET list
    if patch.is_empty() {
        return find_reservation(conn, reservation_id);
    }
    diesel::update(reservations.find(reservation_id))
        .set(patch)
        .returning(Reservation::as_returning())
        .get_result(conn)
        .optional()
}

pub fn delete_reservation(conn: &mut PgConnection, reservation_id: Uuid) -> QueryResult<usize> {
    use crate::schema::reservations::dsl::*;

    diesel::delete(reservations.find(reservation_id)).execute(conn)
}

/// Postgres-backed store over an r2d2 pool. Every call checks out its own
/// connection; multi-statement atomicity is provided by the service's venue
/// locks, with the partial unique index as the last line for duplicates.
#[derive(Clone)]
pub struct PgReservationStore {
    pool: DbPool,
}

impl PgReservationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<ConnectionManager<PgConnection>>> {
        Ok(self.pool.get()?)
    }
}

impl ReservationStore for PgReservationStore {
    fn list_all(&self) -> Result<Vec<Reservation>> {
        let mut conn = self.conn()?;
        Ok(load_all_reservations(&mut conn)?)
    }

    fn list_for_venue_date(&self, venue_id: i32, date: NaiveDate) -> Result<Vec<Reservation>> {
        let mut conn = self.conn()?;
        Ok(load_for_venue_date(&mut conn, venue_id, date)?)
    }

    fn get(&self, id: Uuid) -> Result<Reservation> {
        let mut conn = self.conn()?;
        find_reservation(&mut conn, id)?.ok_or_else(|| ReservationError::not_found(id))
    }

    fn find_by_triple(
        &self,
        owner_id: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        include_cancelled: bool,
    ) -> Result<Option<Reservation>> {
        let mut conn = self.conn()?;
        let matches = find_by_owner_slot(&mut conn, owner_id, date, start_time)?;
        Ok(pick_triple_match(matches, include_cancelled))
    }

    fn create(&self, new: NewReservation) -> Result<Reservation> {
        let mut conn = self.conn()?;
        match insert_reservation(&mut conn, &new) {
            Ok(reservation) => Ok(reservation),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(ReservationError::DuplicateBooking {
                    owner_id: new.owner_id,
                    date: new.date,
                    start_time: new.start_time,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_fields(&self, id: Uuid, patch: &ReservationPatch) -> Result<Reservation> {
        let mut conn = self.conn()?;
        match update_reservation(&mut conn, id, patch) {
            Ok(Some(reservation)) => Ok(reservation),
            Ok(None) => Err(ReservationError::not_found(id)),
            // reinstating a record whose slot was rebooked meanwhile
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                let current = find_reservation(&mut conn, id)?.ok_or_else(|| ReservationError::not_found(id))?;
                Err(ReservationError::DuplicateBooking {
                    owner_id: current.owner_id,
                    date: current.date,
                    start_time: current.start_time,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn()?;
        match delete_reservation(&mut conn, id)? {
            0 => Err(ReservationError::not_found(id)),
            _ => Ok(()),
        }
    }
}
