use chrono::{DateTime, TimeZone, Utc};
use fiacre::stats::StatsProjector;
use fiacre::store::vehicles::NewVehicle;
use fiacre::store::{Database, SnapshotStore, VehicleStore};
use serde_json::{json, Value};

/// Makes a snapshot's kWh equal its raw ideal-range number
const UNIT_FACTOR: f64 = 1000.0 / 1.609_344;

fn doc(odometer_miles: f64, ideal_range_miles: f64, units: &str) -> Value {
    json!({
        "state": "online",
        "charge_state": {
            "battery_level": 60,
            "battery_range": ideal_range_miles - 10.0,
            "est_battery_range": ideal_range_miles - 20.0,
            "ideal_battery_range": ideal_range_miles,
        },
        "vehicle_state": {"odometer": odometer_miles, "locked": true},
        "gui_settings": {"gui_distance_units": units},
    })
}

fn degraded_doc() -> Value {
    json!({"id": 321, "vehicle_id": 1234567890, "state": "asleep"})
}

struct Fixture {
    snapshots: SnapshotStore,
    vehicle_id: i64,
}

fn fixture() -> Fixture {
    let db = Database::in_memory().unwrap();
    let vehicles = VehicleStore::new(db.clone());
    let vehicle = vehicles
        .insert(&NewVehicle {
            remote_id: 321,
            vehicle_id: 1234567890,
            credentials_id: None,
            linked: true,
            display_name: "Middle Earth".to_string(),
            vin: None,
        })
        .unwrap();
    Fixture {
        snapshots: SnapshotStore::new(db),
        vehicle_id: vehicle.id,
    }
}

fn at(h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 3, 27, h, 0, 0).single().unwrap()
}

#[test]
fn degraded_snapshots_never_enter_the_projections() {
    let f = fixture();
    f.snapshots
        .append(f.vehicle_id, at(8), &doc(1000.0, 200.0, "mi/hr"))
        .unwrap();
    f.snapshots.append(f.vehicle_id, at(9), &degraded_doc()).unwrap();
    f.snapshots
        .append(f.vehicle_id, at(10), &doc(1100.0, 180.0, "mi/hr"))
        .unwrap();

    let p = StatsProjector::new(f.snapshots.clone(), UNIT_FACTOR, chrono_tz::UTC);
    let series = p.charge_series(f.vehicle_id, 0, 100).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].created_at, at(8));
    assert!((series[0].distance - 100.0).abs() < 1e-6);
    assert!((series[0].speed_avg - 50.0).abs() < 1e-6);
    assert!((series[0].efficiency - 200.0).abs() < 1e-3);
}

#[test]
fn display_units_follow_the_vehicle_setting() {
    let f = fixture();
    f.snapshots
        .append(f.vehicle_id, at(8), &doc(100.0, 200.0, "km/hr"))
        .unwrap();
    f.snapshots
        .append(f.vehicle_id, at(9), &doc(200.0, 190.0, "km/hr"))
        .unwrap();

    let p = StatsProjector::new(f.snapshots.clone(), UNIT_FACTOR, chrono_tz::UTC);
    let series = p.charge_series(f.vehicle_id, 0, 100).unwrap();
    assert_eq!(series.len(), 1);

    // The API reports miles; a metric display setting converts once
    assert!((series[0].distance - 100.0 * 1.609_344).abs() < 1e-6);
}

#[test]
fn paging_offset_drops_the_newest_snapshots() {
    let f = fixture();
    for (h, odo) in [(8, 1000.0), (9, 1050.0), (10, 1100.0)] {
        f.snapshots
            .append(f.vehicle_id, at(h), &doc(odo, 200.0, "mi/hr"))
            .unwrap();
    }

    let p = StatsProjector::new(f.snapshots.clone(), UNIT_FACTOR, chrono_tz::UTC);
    let all = p.raw_diffs(f.vehicle_id, 0, 100).unwrap();
    assert_eq!(all.len(), 2);

    let offset = p.raw_diffs(f.vehicle_id, 1, 100).unwrap();
    assert_eq!(offset.len(), 1);
    assert_eq!(offset[0].created_at, at(8));
}
