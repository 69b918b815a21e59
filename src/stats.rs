//! Derived statistics over the snapshot log
//!
//! All three projections are pure over an ordered page of snapshots, newest
//! first as the store returns them. They only consider snapshots carrying
//! charge data, because degraded listing snapshots have none. Floats are
//! rounded to two decimals at serialization, never while accumulating.

use crate::error::Result;
use crate::store::snapshots::SnapshotRow;
use crate::store::SnapshotStore;
use crate::telemetry::StateDocument;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Serialize, Serializer};

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn two_decimals<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(round2(*value))
}

fn two_decimals_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_f64(round2(*value)),
        None => serializer.serialize_none(),
    }
}

/// One consecutive-pair entry of the charge-rate series, newest pair first.
#[derive(Debug, Clone, Serialize)]
pub struct ChargePoint {
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "batteryLevel", serialize_with = "two_decimals")]
    pub battery_level: f64,
    #[serde(rename = "batteryLevelKWh", serialize_with = "two_decimals")]
    pub battery_level_kwh: f64,
    #[serde(serialize_with = "two_decimals")]
    pub distance: f64,
    #[serde(rename = "speedAvg", serialize_with = "two_decimals")]
    pub speed_avg: f64,
    /// Wh per local distance unit, zero unless real distance was covered
    /// while the battery drained
    #[serde(serialize_with = "two_decimals")]
    pub efficiency: f64,
}

/// One emitted calendar day, newest day first.
#[derive(Debug, Clone, Serialize)]
pub struct DailyStat {
    pub date: NaiveDate,
    #[serde(rename = "startOdo", serialize_with = "two_decimals")]
    pub start_odo: f64,
    #[serde(rename = "endOdo", serialize_with = "two_decimals")]
    pub end_odo: f64,
    #[serde(serialize_with = "two_decimals")]
    pub distance: f64,
    #[serde(rename = "chargedKWh", serialize_with = "two_decimals")]
    pub charged_kwh: f64,
    #[serde(rename = "usedKWh", serialize_with = "two_decimals")]
    pub used_kwh: f64,
    #[serde(serialize_with = "two_decimals_opt")]
    pub efficiency: Option<f64>,
}

/// Unaggregated adjacent-pair deltas for debugging, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct RawPoint {
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "batteryLevel", serialize_with = "two_decimals_opt")]
    pub battery_level: Option<f64>,
    #[serde(rename = "batteryLevelKWh", serialize_with = "two_decimals_opt")]
    pub battery_level_kwh: Option<f64>,
    #[serde(rename = "diffBatteryLevelKWh", serialize_with = "two_decimals_opt")]
    pub diff_battery_level_kwh: Option<f64>,
    #[serde(rename = "odo", serialize_with = "two_decimals_opt")]
    pub odo: Option<f64>,
    #[serde(rename = "diffOdo", serialize_with = "two_decimals_opt")]
    pub diff_odo: Option<f64>,
    #[serde(rename = "batteryRange", serialize_with = "two_decimals_opt")]
    pub battery_range: Option<f64>,
    #[serde(rename = "estBatteryRange", serialize_with = "two_decimals_opt")]
    pub est_battery_range: Option<f64>,
    #[serde(rename = "idealBatteryRange", serialize_with = "two_decimals_opt")]
    pub ideal_battery_range: Option<f64>,
    #[serde(rename = "diffBatteryRange", serialize_with = "two_decimals_opt")]
    pub diff_battery_range: Option<f64>,
    #[serde(rename = "diffEstBatteryRange", serialize_with = "two_decimals_opt")]
    pub diff_est_battery_range: Option<f64>,
    #[serde(rename = "diffIdealBatteryRange", serialize_with = "two_decimals_opt")]
    pub diff_ideal_battery_range: Option<f64>,
}

struct Sample {
    captured_at: DateTime<Utc>,
    doc: StateDocument,
}

impl Sample {
    fn odometer(&self) -> Option<f64> {
        self.doc.local_odometer()
    }
}

fn diff(newer: Option<f64>, older: Option<f64>) -> Option<f64> {
    Some(newer? - older?)
}

pub struct StatsProjector {
    snapshots: SnapshotStore,
    range_wh_per_km: f64,
    rollup_tz: Tz,
}

impl StatsProjector {
    pub fn new(snapshots: SnapshotStore, range_wh_per_km: f64, rollup_tz: Tz) -> Self {
        Self {
            snapshots,
            range_wh_per_km,
            rollup_tz,
        }
    }

    fn samples(&self, vehicle_id: i64, offset: u32, limit: u32) -> Result<Vec<Sample>> {
        let rows = self
            .snapshots
            .page_with_charge_data(vehicle_id, offset, limit)?;
        Ok(rows
            .into_iter()
            .filter_map(|row: SnapshotRow| {
                let doc = StateDocument::from_value(&row.data).ok()?;
                Some(Sample {
                    captured_at: row.captured_at,
                    doc,
                })
            })
            .collect())
    }

    fn soc_kwh(&self, sample: &Sample) -> Option<f64> {
        sample.doc.battery_energy_kwh(self.range_wh_per_km)
    }

    /// Consecutive-pair distance, consumption and average speed, walking
    /// backward in time. Each entry is keyed on the older snapshot.
    pub fn charge_series(
        &self,
        vehicle_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<ChargePoint>> {
        let samples = self.samples(vehicle_id, offset, limit)?;
        let mut results = Vec::new();
        let mut newer: Option<&Sample> = None;
        for sample in &samples {
            let Some(prev) = newer else {
                newer = Some(sample);
                continue;
            };

            if let (Some(newer_odo), Some(older_odo), Some(newer_kwh), Some(older_kwh), Some(level)) = (
                prev.odometer(),
                sample.odometer(),
                self.soc_kwh(prev),
                self.soc_kwh(sample),
                sample.doc.battery_level(),
            ) {
                let distance = newer_odo - older_odo;
                let kwh_used = older_kwh - newer_kwh;
                let elapsed_hours =
                    (prev.captured_at - sample.captured_at).num_milliseconds() as f64 / 3_600_000.0;
                results.push(ChargePoint {
                    created_at: sample.captured_at,
                    battery_level: level,
                    battery_level_kwh: older_kwh,
                    distance,
                    speed_avg: if elapsed_hours > 0.0 {
                        distance / elapsed_hours
                    } else {
                        0.0
                    },
                    efficiency: if distance > 1.0 && kwh_used > 0.0 {
                        kwh_used * 1000.0 / distance
                    } else {
                        0.0
                    },
                });
            }
            newer = Some(sample);
        }
        Ok(results)
    }

    /// Calendar-day rollup in the configured timezone. A day is emitted only
    /// once a snapshot from an older day is seen, so the oldest day in the
    /// page stays unemitted. The cross-midnight pair's energy delta belongs
    /// to the older day, and the older day's newest odometer is the emitted
    /// day's starting reading.
    pub fn daily_rollup(
        &self,
        vehicle_id: i64,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<DailyStat>> {
        let samples = self.samples(vehicle_id, offset, limit)?;
        let Some(first) = samples.first() else {
            return Ok(Vec::new());
        };

        let day_of = |sample: &Sample| -> NaiveDate {
            sample.captured_at.with_timezone(&self.rollup_tz).date_naive()
        };

        let mut results = Vec::new();
        let mut current_day = day_of(first);
        let mut day_newest: &Sample = first;
        let mut newer: &Sample = first;
        let mut charged_kwh = 0.0;
        let mut used_kwh = 0.0;

        for sample in &samples {
            let day = day_of(sample);
            if day != current_day {
                if let (Some(end_odo), Some(start_odo)) =
                    (day_newest.odometer(), sample.odometer())
                {
                    let distance = end_odo - start_odo;
                    results.push(DailyStat {
                        date: current_day,
                        start_odo,
                        end_odo,
                        distance,
                        charged_kwh,
                        used_kwh,
                        efficiency: if distance > 1.0 {
                            Some(used_kwh * 1000.0 / distance)
                        } else {
                            None
                        },
                    });
                }
                day_newest = sample;
                charged_kwh = 0.0;
                used_kwh = 0.0;
                current_day = day;
            }

            if let (Some(newer_kwh), Some(older_kwh)) = (self.soc_kwh(newer), self.soc_kwh(sample))
            {
                if newer_kwh > older_kwh {
                    charged_kwh += newer_kwh - older_kwh;
                } else {
                    used_kwh += older_kwh - newer_kwh;
                }
            }
            newer = sample;
        }
        Ok(results)
    }

    /// Adjacent-pair deltas with no aggregation, reversed to oldest first.
    pub fn raw_diffs(&self, vehicle_id: i64, offset: u32, limit: u32) -> Result<Vec<RawPoint>> {
        let samples = self.samples(vehicle_id, offset, limit)?;
        let mut results = Vec::new();
        let mut newer: Option<&Sample> = None;
        for sample in &samples {
            let Some(prev) = newer else {
                newer = Some(sample);
                continue;
            };

            results.push(RawPoint {
                created_at: sample.captured_at,
                battery_level: sample.doc.battery_level(),
                battery_level_kwh: self.soc_kwh(sample),
                diff_battery_level_kwh: diff(self.soc_kwh(prev), self.soc_kwh(sample)),
                odo: sample.odometer(),
                diff_odo: diff(prev.odometer(), sample.odometer()),
                battery_range: sample.doc.local_battery_range(),
                est_battery_range: sample.doc.local_est_battery_range(),
                ideal_battery_range: sample.doc.local_ideal_battery_range(),
                diff_battery_range: diff(
                    prev.doc.local_battery_range(),
                    sample.doc.local_battery_range(),
                ),
                diff_est_battery_range: diff(
                    prev.doc.local_est_battery_range(),
                    sample.doc.local_est_battery_range(),
                ),
                diff_ideal_battery_range: diff(
                    prev.doc.local_ideal_battery_range(),
                    sample.doc.local_ideal_battery_range(),
                ),
            });
            newer = Some(sample);
        }
        results.reverse();
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::vehicles::NewVehicle;
    use crate::store::{Database, VehicleStore};
    use chrono::TimeZone;
    use serde_json::json;

    /// With this factor a snapshot's kWh equals its raw ideal range value,
    /// which keeps expected deltas readable.
    fn unit_factor() -> f64 {
        1000.0 / 1.609_344
    }

    fn snapshot(odometer: f64, ideal_range: f64) -> serde_json::Value {
        json!({
            "state": "online",
            "charge_state": {
                "battery_level": 60,
                "battery_range": ideal_range - 10.0,
                "est_battery_range": ideal_range - 20.0,
                "ideal_battery_range": ideal_range,
            },
            "vehicle_state": {"odometer": odometer, "locked": true},
        })
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

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
    }

    fn projector(f: &Fixture, tz: Tz) -> StatsProjector {
        StatsProjector::new(f.snapshots.clone(), unit_factor(), tz)
    }

    #[test]
    fn test_charge_series_pairs_walk_backward() {
        let f = fixture();
        // Oldest to newest: 100 km then 50 km driven, battery draining
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 8, 0, 0), &snapshot(1000.0, 200.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 10, 0, 0), &snapshot(1100.0, 180.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 11, 0, 0), &snapshot(1150.0, 171.0))
            .unwrap();

        let p = projector(&f, chrono_tz::UTC);
        let series = p.charge_series(f.vehicle_id, 0, 100).unwrap();
        assert_eq!(series.len(), 2);

        // Newest pair first, keyed on the older snapshot of the pair
        assert_eq!(series[0].created_at, at(2019, 3, 27, 10, 0, 0));
        assert!((series[0].distance - 50.0).abs() < 1e-6);
        assert!((series[0].speed_avg - 50.0).abs() < 1e-6);
        assert!((series[0].efficiency - 9.0 * 1000.0 / 50.0).abs() < 1e-3);

        assert_eq!(series[1].created_at, at(2019, 3, 27, 8, 0, 0));
        assert!((series[1].distance - 100.0).abs() < 1e-6);
        assert!((series[1].speed_avg - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_charge_series_efficiency_gates() {
        let f = fixture();
        // Battery rose while parked: no distance, no consumption
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 8, 0, 0), &snapshot(1000.0, 150.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 9, 0, 0), &snapshot(1000.5, 200.0))
            .unwrap();

        let p = projector(&f, chrono_tz::UTC);
        let series = p.charge_series(f.vehicle_id, 0, 100).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].efficiency, 0.0);
    }

    #[test]
    fn test_daily_rollup_splits_on_calendar_day() {
        let f = fixture();
        // Day 26 trailing data, a full day 27, and seconds into day 28
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 26, 23, 50, 0), &snapshot(300.0, 210.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 12, 0, 0), &snapshot(400.0, 160.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 23, 55, 0), &snapshot(480.0, 120.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 28, 0, 0, 5), &snapshot(500.0, 140.0))
            .unwrap();

        let p = projector(&f, chrono_tz::UTC);
        let days = p.daily_rollup(f.vehicle_id, 0, 100).unwrap();
        assert_eq!(days.len(), 2);

        // Seconds into day 28 still end day 27
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2019, 3, 28).unwrap());
        assert!((days[0].start_odo - 480.0).abs() < 1e-6);
        assert!((days[0].end_odo - 500.0).abs() < 1e-6);
        assert_eq!(days[0].charged_kwh, 0.0);
        assert_eq!(days[0].used_kwh, 0.0);

        // Day 27: the charge over midnight into the 28th belongs here, while
        // the overnight pair into the 26th is attributed to day 26
        let day27 = &days[1];
        assert_eq!(day27.date, NaiveDate::from_ymd_opt(2019, 3, 27).unwrap());
        assert!((day27.start_odo - 300.0).abs() < 1e-6);
        assert!((day27.end_odo - 480.0).abs() < 1e-6);
        assert!((day27.distance - 180.0).abs() < 1e-6);
        assert!((day27.charged_kwh - 20.0).abs() < 1e-3);
        assert!((day27.used_kwh - 40.0).abs() < 1e-3);
        let expected_eff = 40.0 * 1000.0 / 180.0;
        assert!((day27.efficiency.unwrap() - expected_eff).abs() < 1.0);

        // Day 26 only has trailing data and is never emitted
    }

    #[test]
    fn test_daily_rollup_buckets_in_configured_timezone() {
        let f = fixture();
        // 23:30 UTC is already the next day in Zurich
        f.snapshots
            .append(f.vehicle_id, at(2019, 1, 15, 22, 0, 0), &snapshot(300.0, 200.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 1, 15, 23, 30, 0), &snapshot(320.0, 190.0))
            .unwrap();

        let utc = projector(&f, chrono_tz::UTC);
        assert!(utc.daily_rollup(f.vehicle_id, 0, 100).unwrap().is_empty());

        let zurich = projector(&f, chrono_tz::Europe::Zurich);
        let days = zurich.daily_rollup(f.vehicle_id, 0, 100).unwrap();
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, NaiveDate::from_ymd_opt(2019, 1, 16).unwrap());
    }

    #[test]
    fn test_raw_diffs_reverse_to_oldest_first() {
        let f = fixture();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 8, 0, 0), &snapshot(1000.0, 200.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 9, 0, 0), &snapshot(1050.0, 180.0))
            .unwrap();
        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 10, 0, 0), &snapshot(1100.0, 160.0))
            .unwrap();

        let p = projector(&f, chrono_tz::UTC);
        let raw = p.raw_diffs(f.vehicle_id, 0, 100).unwrap();
        assert_eq!(raw.len(), 2);

        assert_eq!(raw[0].created_at, at(2019, 3, 27, 8, 0, 0));
        assert_eq!(raw[1].created_at, at(2019, 3, 27, 9, 0, 0));
        assert!((raw[1].diff_odo.unwrap() - 50.0).abs() < 1e-6);
        assert!((raw[1].diff_battery_level_kwh.unwrap() + 20.0).abs() < 1e-3);
        // Ranges with no gui settings pass through as raw API values
        assert!((raw[1].ideal_battery_range.unwrap() - 180.0).abs() < 1e-6);
        assert!((raw[1].diff_ideal_battery_range.unwrap() + 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_projections_are_empty_below_two_snapshots() {
        let f = fixture();
        let p = projector(&f, chrono_tz::UTC);
        assert!(p.charge_series(f.vehicle_id, 0, 100).unwrap().is_empty());
        assert!(p.daily_rollup(f.vehicle_id, 0, 100).unwrap().is_empty());
        assert!(p.raw_diffs(f.vehicle_id, 0, 100).unwrap().is_empty());

        f.snapshots
            .append(f.vehicle_id, at(2019, 3, 27, 8, 0, 0), &snapshot(1000.0, 200.0))
            .unwrap();
        assert!(p.charge_series(f.vehicle_id, 0, 100).unwrap().is_empty());
        assert!(p.raw_diffs(f.vehicle_id, 0, 100).unwrap().is_empty());
    }

    #[test]
    fn test_two_decimal_serialization() {
        let stat = DailyStat {
            date: NaiveDate::from_ymd_opt(2019, 3, 27).unwrap(),
            start_odo: 300.123_456,
            end_odo: 480.987_654,
            distance: 180.864_198,
            charged_kwh: 20.005,
            used_kwh: 90.0,
            efficiency: None,
        };
        let json = serde_json::to_value(&stat).unwrap();
        assert_eq!(json["startOdo"], 300.12);
        assert_eq!(json["endOdo"], 480.99);
        assert_eq!(json["efficiency"], serde_json::Value::Null);
    }
}
