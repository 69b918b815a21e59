//! Rental bookings and their odometer captures

use super::{encode_ts, opt_ts_column, ts_column, Database};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct RentalRow {
    pub id: i64,
    pub vehicle_id: Option<i64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub description: String,
    /// Unguessable token handed to the renter
    pub code: String,
    pub odometer_start: Option<f64>,
    pub odometer_start_measured_at: Option<DateTime<Utc>>,
    pub odometer_end: Option<f64>,
    pub odometer_end_measured_at: Option<DateTime<Utc>>,
    pub price_brutto: Option<f64>,
    pub price_netto: Option<f64>,
    pub price_charging: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RentalRow {
    /// Whether the rental window covers the given instant.
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    /// The next boundary of this rental after `now`, if any. The start
    /// takes precedence while it is still in the future.
    pub fn next_boundary(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.start_at > now {
            Some(self.start_at)
        } else if self.end_at > now {
            Some(self.end_at)
        } else {
            None
        }
    }

    /// Kilometers driven, known once both odometer captures exist.
    pub fn distance_driven(&self) -> Option<f64> {
        match (self.odometer_start, self.odometer_end) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRental {
    pub vehicle_id: Option<i64>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub description: String,
    pub code: String,
}

const COLUMNS: &str = "id, vehicle_id, start_at, end_at, description, code, \
     odometer_start, odometer_start_measured_at, odometer_end, odometer_end_measured_at, \
     price_brutto, price_netto, price_charging, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RentalRow> {
    Ok(RentalRow {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        start_at: ts_column(row, 2)?,
        end_at: ts_column(row, 3)?,
        description: row.get(4)?,
        code: row.get(5)?,
        odometer_start: row.get(6)?,
        odometer_start_measured_at: opt_ts_column(row, 7)?,
        odometer_end: row.get(8)?,
        odometer_end_measured_at: opt_ts_column(row, 9)?,
        price_brutto: row.get(10)?,
        price_netto: row.get(11)?,
        price_charging: row.get(12)?,
        created_at: ts_column(row, 13)?,
        updated_at: ts_column(row, 14)?,
    })
}

#[derive(Clone)]
pub struct RentalStore {
    db: Database,
}

impl RentalStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, rental: &NewRental) -> Result<RentalRow> {
        let now = encode_ts(Utc::now());
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rentals \
                 (vehicle_id, start_at, end_at, description, code, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    rental.vehicle_id,
                    encode_ts(rental.start_at),
                    encode_ts(rental.end_at),
                    rental.description,
                    rental.code,
                    now,
                ],
            )?;

            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                &format!("SELECT {} FROM rentals WHERE id = ?1", COLUMNS),
                params![id],
                map_row,
            )?;
            Ok(row)
        })
    }

    /// Write every mutable field back. Used by the manage API; scheduled
    /// odometer captures go through the conditional setters instead.
    pub fn save(&self, rental: &RentalRow) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE rentals SET \
                    vehicle_id = ?2, start_at = ?3, end_at = ?4, description = ?5, \
                    odometer_start = ?6, odometer_start_measured_at = ?7, \
                    odometer_end = ?8, odometer_end_measured_at = ?9, \
                    price_brutto = ?10, price_netto = ?11, price_charging = ?12, \
                    updated_at = ?13 \
                 WHERE id = ?1",
                params![
                    rental.id,
                    rental.vehicle_id,
                    encode_ts(rental.start_at),
                    encode_ts(rental.end_at),
                    rental.description,
                    rental.odometer_start,
                    rental.odometer_start_measured_at.map(encode_ts),
                    rental.odometer_end,
                    rental.odometer_end_measured_at.map(encode_ts),
                    rental.price_brutto,
                    rental.price_netto,
                    rental.price_charging,
                    encode_ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<RentalRow>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM rentals WHERE id = ?1", COLUMNS),
                    params![id],
                    map_row,
                )
                .ok();
            Ok(row)
        })
    }

    pub fn get_by_code(&self, code: &str) -> Result<Option<RentalRow>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM rentals WHERE code = ?1", COLUMNS),
                    params![code],
                    map_row,
                )
                .ok();
            Ok(row)
        })
    }

    pub fn list(&self) -> Result<Vec<RentalRow>> {
        self.query(
            &format!("SELECT {} FROM rentals ORDER BY start_at", COLUMNS),
            params![],
        )
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM rentals WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }

    /// Earliest rental boundary strictly after `now`, across all rentals.
    pub fn next_boundary_after(&self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        self.db.with_conn(|conn| {
            let raw: Option<String> = conn.query_row(
                "SELECT MIN(t) FROM ( \
                    SELECT start_at AS t FROM rentals WHERE start_at > ?1 \
                    UNION ALL \
                    SELECT end_at AS t FROM rentals WHERE end_at > ?1 \
                 )",
                params![encode_ts(now)],
                |row| row.get(0),
            )?;
            match raw {
                Some(raw) => Ok(Some(super::decode_ts(&raw)?)),
                None => Ok(None),
            }
        })
    }

    /// Rentals whose start falls inside the window and whose start odometer
    /// has not been captured yet.
    pub fn starts_pending_in(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RentalRow>> {
        self.query(
            &format!(
                "SELECT {} FROM rentals \
                 WHERE start_at >= ?1 AND start_at <= ?2 AND odometer_start IS NULL \
                 ORDER BY start_at",
                COLUMNS
            ),
            params![encode_ts(window_start), encode_ts(window_end)],
        )
    }

    pub fn ends_pending_in(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RentalRow>> {
        self.query(
            &format!(
                "SELECT {} FROM rentals \
                 WHERE end_at >= ?1 AND end_at <= ?2 AND odometer_end IS NULL \
                 ORDER BY end_at",
                COLUMNS
            ),
            params![encode_ts(window_start), encode_ts(window_end)],
        )
    }

    /// Record the start odometer unless a value is already present.
    /// Returns whether this call performed the write.
    pub fn set_odometer_start_if_unset(
        &self,
        id: i64,
        odometer_km: f64,
        measured_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE rentals SET \
                    odometer_start = ?2, odometer_start_measured_at = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND odometer_start IS NULL",
                params![id, odometer_km, encode_ts(measured_at), encode_ts(Utc::now())],
            )?;
            Ok(affected > 0)
        })
    }

    pub fn set_odometer_end_if_unset(
        &self,
        id: i64,
        odometer_km: f64,
        measured_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.with_conn(|conn| {
            let affected = conn.execute(
                "UPDATE rentals SET \
                    odometer_end = ?2, odometer_end_measured_at = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND odometer_end IS NULL",
                params![id, odometer_km, encode_ts(measured_at), encode_ts(Utc::now())],
            )?;
            Ok(affected > 0)
        })
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<RentalRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(args, map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
