//! Append-only vehicle state snapshots
//!
//! The raw API document is kept verbatim as JSON text. Queries that need to
//! look inside it use SQLite's json_extract so unknown fields survive intact.

use super::{encode_ts, ts_column, Database};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct SnapshotRow {
    pub id: i64,
    pub vehicle_id: i64,
    pub captured_at: DateTime<Utc>,
    pub data: Value,
}

const COLUMNS: &str = "id, vehicle_id, captured_at, data";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SnapshotRow> {
    let raw: String = row.get(3)?;
    let data = serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SnapshotRow {
        id: row.get(0)?,
        vehicle_id: row.get(1)?,
        captured_at: ts_column(row, 2)?,
        data,
    })
}

#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn append(
        &self,
        vehicle_id: i64,
        captured_at: DateTime<Utc>,
        data: &Value,
    ) -> Result<SnapshotRow> {
        let encoded = serde_json::to_string(data)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO snapshots (vehicle_id, captured_at, data) VALUES (?1, ?2, ?3)",
                params![vehicle_id, encode_ts(captured_at), encoded],
            )?;
            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                &format!("SELECT {} FROM snapshots WHERE id = ?1", COLUMNS),
                params![id],
                map_row,
            )?;
            Ok(row)
        })
    }

    pub fn latest(&self, vehicle_id: i64) -> Result<Option<SnapshotRow>> {
        self.query_first(
            &format!(
                "SELECT {} FROM snapshots WHERE vehicle_id = ?1 \
                 ORDER BY captured_at DESC, id DESC LIMIT 1",
                COLUMNS
            ),
            params![vehicle_id],
        )
    }

    pub fn latest_with_charge_data(&self, vehicle_id: i64) -> Result<Option<SnapshotRow>> {
        self.query_first(
            &format!(
                "SELECT {} FROM snapshots WHERE vehicle_id = ?1 \
                 AND json_extract(data, '$.charge_state.battery_level') IS NOT NULL \
                 ORDER BY captured_at DESC, id DESC LIMIT 1",
                COLUMNS
            ),
            params![vehicle_id],
        )
    }

    /// Latest snapshot taken while the vehicle reported itself online.
    pub fn latest_online(&self, vehicle_id: i64) -> Result<Option<SnapshotRow>> {
        self.query_first(
            &format!(
                "SELECT {} FROM snapshots WHERE vehicle_id = ?1 \
                 AND json_extract(data, '$.state') = 'online' \
                 ORDER BY captured_at DESC, id DESC LIMIT 1",
                COLUMNS
            ),
            params![vehicle_id],
        )
    }

    pub fn latest_locked(&self, vehicle_id: i64, locked: bool) -> Result<Option<SnapshotRow>> {
        self.query_first(
            &format!(
                "SELECT {} FROM snapshots WHERE vehicle_id = ?1 \
                 AND json_extract(data, '$.vehicle_state.locked') = ?2 \
                 ORDER BY captured_at DESC, id DESC LIMIT 1",
                COLUMNS
            ),
            params![vehicle_id, locked],
        )
    }

    /// Snapshots taken at or after `since`, newest first.
    pub fn recent_since(
        &self,
        vehicle_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<SnapshotRow>> {
        self.query_all(
            &format!(
                "SELECT {} FROM snapshots WHERE vehicle_id = ?1 AND captured_at >= ?2 \
                 ORDER BY captured_at DESC, id DESC",
                COLUMNS
            ),
            params![vehicle_id, encode_ts(since)],
        )
    }

    /// A page of snapshots that carry charge data, newest first. This is the
    /// input every statistics projection walks.
    pub fn page_with_charge_data(
        &self,
        vehicle_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<SnapshotRow>> {
        self.query_all(
            &format!(
                "SELECT {} FROM snapshots WHERE vehicle_id = ?1 \
                 AND json_extract(data, '$.charge_state.battery_level') IS NOT NULL \
                 ORDER BY captured_at DESC, id DESC LIMIT ?2 OFFSET ?3",
                COLUMNS
            ),
            params![vehicle_id, limit, offset],
        )
    }

    fn query_first(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Option<SnapshotRow>> {
        self.db.with_conn(|conn| {
            let row = conn.query_row(sql, args, map_row).ok();
            Ok(row)
        })
    }

    fn query_all(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<SnapshotRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(args, map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
