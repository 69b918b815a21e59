use chrono::{Duration, Utc};
use fiacre::store::vehicles::NewVehicle;
use fiacre::store::{CredentialStore, Database, VehicleStore};

fn new_vehicle(remote_id: i64, stable_id: i64, credentials_id: Option<i64>) -> NewVehicle {
    NewVehicle {
        remote_id,
        vehicle_id: stable_id,
        credentials_id,
        linked: true,
        display_name: format!("car-{}", stable_id),
        vin: None,
    }
}

#[test]
fn credential_removal_detaches_vehicles() {
    let db = Database::in_memory().unwrap();
    let credentials = CredentialStore::new(db.clone());
    let vehicles = VehicleStore::new(db);

    let credential = credentials
        .upsert(
            "owner@example.com",
            "enc-access",
            "enc-refresh",
            "salt",
            "nonce",
            Utc::now() + Duration::hours(8),
        )
        .unwrap();
    let vehicle = vehicles
        .insert(&new_vehicle(321, 1234567890, Some(credential.id)))
        .unwrap();

    assert!(credentials.delete(credential.id).unwrap());

    let vehicle = vehicles.get(vehicle.id).unwrap().unwrap();
    assert!(vehicle.credentials_id.is_none());
    assert!(!vehicle.is_active());

    // The orphan is still linked until a reconcile pass unlinks it
    let orphans = vehicles.list_linked_without_credentials().unwrap();
    assert_eq!(orphans.len(), 1);
    vehicles.unlink(vehicle.id).unwrap();
    assert!(vehicles.list_linked_without_credentials().unwrap().is_empty());
}

#[test]
fn reconciliation_key_is_the_stable_id() {
    let db = Database::in_memory().unwrap();
    let vehicles = VehicleStore::new(db);

    let inserted = vehicles.insert(&new_vehicle(321, 1234567890, None)).unwrap();

    // A new remote session hands out a different remote_id
    let mut found = vehicles.find_by_stable_id(1234567890).unwrap().unwrap();
    assert_eq!(found.id, inserted.id);
    found.remote_id = 654;
    vehicles.save(&found).unwrap();

    let found = vehicles.find_by_stable_id(1234567890).unwrap().unwrap();
    assert_eq!(found.remote_id, 654);
}

#[test]
fn active_listing_needs_link_owner_and_mobile_access() {
    let db = Database::in_memory().unwrap();
    let credentials = CredentialStore::new(db.clone());
    let vehicles = VehicleStore::new(db);

    let credential = credentials
        .upsert(
            "owner@example.com",
            "enc-access",
            "enc-refresh",
            "salt",
            "nonce",
            Utc::now() + Duration::hours(8),
        )
        .unwrap();

    let mut active = vehicles
        .insert(&new_vehicle(1, 101, Some(credential.id)))
        .unwrap();
    active.mobile_enabled = Some(true);
    vehicles.save(&active).unwrap();

    let mut no_mobile = vehicles
        .insert(&new_vehicle(2, 102, Some(credential.id)))
        .unwrap();
    no_mobile.mobile_enabled = Some(false);
    vehicles.save(&no_mobile).unwrap();

    let mut unlinked = vehicles
        .insert(&new_vehicle(3, 103, Some(credential.id)))
        .unwrap();
    unlinked.mobile_enabled = Some(true);
    vehicles.save(&unlinked).unwrap();
    vehicles.unlink(unlinked.id).unwrap();

    let active_ids: Vec<i64> = vehicles.list_active().unwrap().iter().map(|v| v.id).collect();
    assert_eq!(active_ids, vec![active.id]);
}
