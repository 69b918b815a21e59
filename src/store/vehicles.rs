//! Vehicle records
//!
//! A vehicle carries two API identifiers: `remote_id` changes between API
//! sessions and is what commands are addressed to, `vehicle_id` is stable
//! for the life of the car and is the reconciliation key.

use super::{encode_ts, ts_column, Database};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct VehicleRow {
    pub id: i64,
    pub remote_id: i64,
    pub vehicle_id: i64,
    pub credentials_id: Option<i64>,
    pub linked: bool,
    pub display_name: String,
    pub model: Option<String>,
    pub color: Option<String>,
    pub vin: Option<String>,
    pub state: Option<String>,
    pub mobile_enabled: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VehicleRow {
    /// A vehicle takes part in rentals and background fetching only when it
    /// is linked to an account and the account allows mobile access.
    pub fn is_active(&self) -> bool {
        self.linked && self.credentials_id.is_some() && self.mobile_enabled == Some(true)
    }
}

/// Fields known at the moment a vehicle first appears in an account listing.
#[derive(Debug, Clone)]
pub struct NewVehicle {
    pub remote_id: i64,
    pub vehicle_id: i64,
    pub credentials_id: Option<i64>,
    pub linked: bool,
    pub display_name: String,
    pub vin: Option<String>,
}

const COLUMNS: &str = "id, remote_id, vehicle_id, credentials_id, linked, display_name, \
     model, color, vin, state, mobile_enabled, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VehicleRow> {
    Ok(VehicleRow {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        vehicle_id: row.get(2)?,
        credentials_id: row.get(3)?,
        linked: row.get(4)?,
        display_name: row.get(5)?,
        model: row.get(6)?,
        color: row.get(7)?,
        vin: row.get(8)?,
        state: row.get(9)?,
        mobile_enabled: row.get(10)?,
        created_at: ts_column(row, 11)?,
        updated_at: ts_column(row, 12)?,
    })
}

#[derive(Clone)]
pub struct VehicleStore {
    db: Database,
}

impl VehicleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn insert(&self, vehicle: &NewVehicle) -> Result<VehicleRow> {
        let now = encode_ts(Utc::now());
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO vehicles \
                 (remote_id, vehicle_id, credentials_id, linked, display_name, vin, \
                  created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    vehicle.remote_id,
                    vehicle.vehicle_id,
                    vehicle.credentials_id,
                    vehicle.linked,
                    vehicle.display_name,
                    vehicle.vin,
                    now,
                ],
            )?;

            let id = conn.last_insert_rowid();
            let row = conn.query_row(
                &format!("SELECT {} FROM vehicles WHERE id = ?1", COLUMNS),
                params![id],
                map_row,
            )?;
            Ok(row)
        })
    }

    /// Write every mutable field of the row back. `updated_at` is bumped.
    pub fn save(&self, vehicle: &VehicleRow) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE vehicles SET \
                    remote_id = ?2, vehicle_id = ?3, credentials_id = ?4, linked = ?5, \
                    display_name = ?6, model = ?7, color = ?8, vin = ?9, state = ?10, \
                    mobile_enabled = ?11, updated_at = ?12 \
                 WHERE id = ?1",
                params![
                    vehicle.id,
                    vehicle.remote_id,
                    vehicle.vehicle_id,
                    vehicle.credentials_id,
                    vehicle.linked,
                    vehicle.display_name,
                    vehicle.model,
                    vehicle.color,
                    vehicle.vin,
                    vehicle.state,
                    vehicle.mobile_enabled,
                    encode_ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<VehicleRow>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM vehicles WHERE id = ?1", COLUMNS),
                    params![id],
                    map_row,
                )
                .ok();
            Ok(row)
        })
    }

    /// Look a vehicle up by its stable API identifier, across all accounts.
    pub fn find_by_stable_id(&self, vehicle_id: i64) -> Result<Option<VehicleRow>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM vehicles WHERE vehicle_id = ?1", COLUMNS),
                    params![vehicle_id],
                    map_row,
                )
                .ok();
            Ok(row)
        })
    }

    pub fn list(&self) -> Result<Vec<VehicleRow>> {
        self.query(&format!("SELECT {} FROM vehicles ORDER BY id", COLUMNS), params![])
    }

    pub fn list_for_credentials(&self, credentials_id: i64) -> Result<Vec<VehicleRow>> {
        self.query(
            &format!(
                "SELECT {} FROM vehicles WHERE credentials_id = ?1 ORDER BY id",
                COLUMNS
            ),
            params![credentials_id],
        )
    }

    pub fn list_active(&self) -> Result<Vec<VehicleRow>> {
        self.query(
            &format!(
                "SELECT {} FROM vehicles \
                 WHERE linked = 1 AND credentials_id IS NOT NULL AND mobile_enabled = 1 \
                 ORDER BY id",
                COLUMNS
            ),
            params![],
        )
    }

    /// Linked rows whose account has been deleted. These are swept to
    /// unlinked during reconciliation.
    pub fn list_linked_without_credentials(&self) -> Result<Vec<VehicleRow>> {
        self.query(
            &format!(
                "SELECT {} FROM vehicles WHERE credentials_id IS NULL AND linked = 1 ORDER BY id",
                COLUMNS
            ),
            params![],
        )
    }

    pub fn unlink(&self, id: i64) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE vehicles SET linked = 0, updated_at = ?2 WHERE id = ?1",
                params![id, encode_ts(Utc::now())],
            )?;
            Ok(())
        })
    }

    fn query(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<VehicleRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(args, map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_vehicle(remote_id: i64, vehicle_id: i64, credentials_id: Option<i64>) -> NewVehicle {
        NewVehicle {
            remote_id,
            vehicle_id,
            credentials_id,
            linked: true,
            display_name: "Middle Earth".to_string(),
            vin: Some("5YJSA1CN5CFP01657".to_string()),
        }
    }

    fn stores() -> (CredentialStoreForTest, VehicleStore) {
        let db = Database::in_memory().unwrap();
        (
            CredentialStoreForTest(super::super::CredentialStore::new(db.clone())),
            VehicleStore::new(db),
        )
    }

    struct CredentialStoreForTest(super::super::CredentialStore);

    impl CredentialStoreForTest {
        fn add(&self, email: &str) -> i64 {
            self.0
                .upsert(email, "a", "b", "s", "n", Utc::now())
                .unwrap()
                .id
        }
    }

    #[test]
    fn test_insert_and_find_by_stable_id() {
        let (creds, vehicles) = stores();
        let cred_id = creds.add("owner@example.com");

        let row = vehicles
            .insert(&new_vehicle(321, 1234567890, Some(cred_id)))
            .unwrap();
        assert_eq!(row.vehicle_id, 1234567890);
        assert!(row.mobile_enabled.is_none());

        let found = vehicles.find_by_stable_id(1234567890).unwrap().unwrap();
        assert_eq!(found.id, row.id);
        assert!(vehicles.find_by_stable_id(55).unwrap().is_none());
    }

    #[test]
    fn test_is_active_requires_mobile_access() {
        let (creds, vehicles) = stores();
        let cred_id = creds.add("owner@example.com");

        let mut row = vehicles
            .insert(&new_vehicle(321, 1234567890, Some(cred_id)))
            .unwrap();
        assert!(!row.is_active());
        assert!(vehicles.list_active().unwrap().is_empty());

        row.mobile_enabled = Some(true);
        vehicles.save(&row).unwrap();
        assert_eq!(vehicles.list_active().unwrap().len(), 1);

        row.mobile_enabled = Some(false);
        vehicles.save(&row).unwrap();
        assert!(vehicles.list_active().unwrap().is_empty());
    }

    #[test]
    fn test_unlink() {
        let (creds, vehicles) = stores();
        let cred_id = creds.add("owner@example.com");
        let row = vehicles
            .insert(&new_vehicle(321, 1234567890, Some(cred_id)))
            .unwrap();

        vehicles.unlink(row.id).unwrap();
        let row = vehicles.get(row.id).unwrap().unwrap();
        assert!(!row.linked);
        assert!(!row.is_active());
    }

    #[test]
    fn test_deleting_credentials_keeps_vehicle() {
        let (creds, vehicles) = stores();
        let cred_id = creds.add("owner@example.com");
        let row = vehicles
            .insert(&new_vehicle(321, 1234567890, Some(cred_id)))
            .unwrap();

        creds.0.delete(cred_id).unwrap();

        let row = vehicles.get(row.id).unwrap().unwrap();
        assert!(row.credentials_id.is_none());
        assert!(row.linked);

        let orphans = vehicles.list_linked_without_credentials().unwrap();
        assert_eq!(orphans.len(), 1);
    }
}
