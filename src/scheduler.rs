//! Rental boundary worker
//!
//! A single background task parks until the next rental start or end, then
//! captures the vehicle odometer for every boundary inside the tolerance
//! window. Request handlers never process boundaries themselves, they only
//! signal the worker so it recomputes its wait.

use crate::error::{FiacreError, Result};
use crate::fetch::Fetcher;
use crate::logging::{get_logger, StructuredLogger};
use crate::store::rentals::RentalRow;
use crate::store::{RentalStore, SnapshotStore, VehicleStore};
use crate::telemetry::StateDocument;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Boundaries older than this are no longer worth measuring.
pub const BOUNDARY_TOLERANCE_MINUTES: i64 = 5;

/// A snapshot must be at most this old to count as a boundary measurement.
pub const FRESHNESS_SECONDS: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Waiting,
    Processing,
}

pub struct BoundaryScheduler {
    rentals: RentalStore,
    vehicles: VehicleStore,
    snapshots: SnapshotStore,
    fetcher: Arc<Fetcher>,
    signal_tx: mpsc::Sender<()>,
    signal_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    state_tx: watch::Sender<WorkerState>,
    initialized_at: parking_lot::Mutex<Option<DateTime<Utc>>>,
    logger: StructuredLogger,
}

impl BoundaryScheduler {
    pub fn new(
        rentals: RentalStore,
        vehicles: VehicleStore,
        snapshots: SnapshotStore,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        // Capacity one: pending wake signals coalesce
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let (state_tx, _) = watch::channel(WorkerState::Idle);
        Self {
            rentals,
            vehicles,
            snapshots,
            fetcher,
            signal_tx,
            signal_rx: tokio::sync::Mutex::new(signal_rx),
            worker: parking_lot::Mutex::new(None),
            state_tx,
            initialized_at: parking_lot::Mutex::new(None),
            logger: get_logger("scheduler"),
        }
    }

    /// Start the worker if none is live, otherwise just interrupt its wait.
    /// Called at startup and after every rental create, edit or delete, so
    /// the worker always waits on the earliest future boundary.
    pub fn ensure_running(self: &Arc<Self>) {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref()
            && !handle.is_finished()
        {
            let _ = self.signal_tx.try_send(());
            return;
        }

        let scheduler = Arc::clone(self);
        *worker = Some(tokio::spawn(async move { scheduler.run().await }));

        let mut initialized = self.initialized_at.lock();
        if initialized.is_none() {
            *initialized = Some(Utc::now());
            self.logger.info("rental boundary worker started");
        } else {
            self.logger.debug("rental boundary worker restarted");
        }
    }

    /// First-start timestamp, `None` until the worker has started once.
    pub fn initialized_at(&self) -> Option<DateTime<Utc>> {
        *self.initialized_at.lock()
    }

    pub fn state(&self) -> WorkerState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state_tx.subscribe()
    }

    async fn run(self: Arc<Self>) {
        // The single live worker holds the receiver for its whole run
        let mut signals = self.signal_rx.lock().await;
        loop {
            let now = Utc::now();
            let boundary = match self.rentals.next_boundary_after(now) {
                Ok(Some(boundary)) => boundary,
                Ok(None) => {
                    self.logger.info("no future rental boundary, worker exiting");
                    break;
                }
                Err(e) => {
                    self.logger
                        .error(&format!("cannot compute next rental boundary: {}", e));
                    break;
                }
            };

            let Ok(wait) = (boundary - now).to_std() else {
                self.logger.error(&format!(
                    "next rental boundary {} is in the past, aborting run",
                    boundary.to_rfc3339_opts(SecondsFormat::Secs, true)
                ));
                break;
            };

            self.state_tx.send_replace(WorkerState::Waiting);
            self.logger.info(&format!(
                "waiting until {} for the next rental boundary",
                boundary.to_rfc3339_opts(SecondsFormat::Secs, true)
            ));

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = signals.recv() => {
                    self.logger.debug("rental schedule changed, recomputing next boundary");
                    continue;
                }
            }

            self.state_tx.send_replace(WorkerState::Processing);
            if let Err(e) = self.update_rentals(Utc::now()).await {
                self.logger
                    .error(&format!("rental boundary pass failed: {}", e));
            }
        }
        self.state_tx.send_replace(WorkerState::Idle);
    }

    /// One processing pass: capture odometers for every rental whose start
    /// or end fell within the tolerance window and is still unmeasured.
    pub async fn update_rentals(&self, reference_time: DateTime<Utc>) -> Result<()> {
        let window_start =
            reference_time - chrono::Duration::minutes(BOUNDARY_TOLERANCE_MINUTES);
        let starts = self.rentals.starts_pending_in(window_start, reference_time)?;
        let ends = self.rentals.ends_pending_in(window_start, reference_time)?;
        if starts.is_empty() && ends.is_empty() {
            self.logger.debug("no rental boundary due");
            return Ok(());
        }
        self.logger.info(&format!(
            "processing {} rental starts and {} rental ends",
            starts.len(),
            ends.len()
        ));

        let mut vehicle_ids: Vec<i64> = starts
            .iter()
            .chain(ends.iter())
            .filter_map(|rental| rental.vehicle_id)
            .collect();
        vehicle_ids.sort_unstable();
        vehicle_ids.dedup();

        let mut measurements: HashMap<i64, (f64, DateTime<Utc>)> = HashMap::new();
        for vehicle_id in vehicle_ids {
            if let Some(measurement) = self.measure_vehicle(vehicle_id).await? {
                measurements.insert(vehicle_id, measurement);
            }
        }

        for rental in &starts {
            if let Some((odometer, measured_at)) = self.measurement_for(rental, &measurements) {
                if self
                    .rentals
                    .set_odometer_start_if_unset(rental.id, odometer, measured_at)?
                {
                    self.logger.info(&format!(
                        "rental {} started at odometer {:.1} km",
                        rental.id, odometer
                    ));
                }
            }
        }
        for rental in &ends {
            if let Some((odometer, measured_at)) = self.measurement_for(rental, &measurements) {
                if self
                    .rentals
                    .set_odometer_end_if_unset(rental.id, odometer, measured_at)?
                {
                    self.logger.info(&format!(
                        "rental {} ended at odometer {:.1} km",
                        rental.id, odometer
                    ));
                }
            }
        }
        Ok(())
    }

    fn measurement_for(
        &self,
        rental: &RentalRow,
        measurements: &HashMap<i64, (f64, DateTime<Utc>)>,
    ) -> Option<(f64, DateTime<Utc>)> {
        let Some(vehicle_id) = rental.vehicle_id else {
            self.logger
                .error(&format!("rental {} is not linked to a vehicle", rental.id));
            return None;
        };
        let measurement = measurements.get(&vehicle_id).copied();
        if measurement.is_none() {
            self.logger.error(&format!(
                "no usable data for this rental boundary, rental {} vehicle {}",
                rental.id, vehicle_id
            ));
        }
        measurement
    }

    /// Force-fetch with wake permission, then accept the latest snapshot
    /// only when it is fresh enough to stand in for the boundary instant.
    async fn measure_vehicle(&self, vehicle_id: i64) -> Result<Option<(f64, DateTime<Utc>)>> {
        let Some(vehicle) = self.vehicles.get(vehicle_id)? else {
            self.logger
                .error(&format!("vehicle {} does not exist", vehicle_id));
            return Ok(None);
        };

        if let Err(e) = self.fetcher.fetch_vehicle(&vehicle, true).await {
            self.logger.error(&format!(
                "boundary fetch failed for vehicle {}: {}",
                vehicle_id, e
            ));
        }

        let Some(snapshot) = self.snapshots.latest(vehicle_id)? else {
            self.logger
                .error(&format!("vehicle {} has no snapshot at all", vehicle_id));
            return Ok(None);
        };
        let age = Utc::now() - snapshot.captured_at;
        if age > chrono::Duration::seconds(FRESHNESS_SECONDS) {
            self.logger.error(&format!(
                "vehicle {} snapshot is {}s old, too stale for a boundary",
                vehicle_id,
                age.num_seconds()
            ));
            return Ok(None);
        }

        let doc = match StateDocument::from_value(&snapshot.data) {
            Ok(doc) => doc,
            Err(FiacreError::Serialization { .. }) => {
                self.logger
                    .error(&format!("vehicle {} snapshot is not a state document", vehicle_id));
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let Some(odometer) = doc.local_odometer() else {
            self.logger.error(&format!(
                "vehicle {} snapshot carries no odometer reading",
                vehicle_id
            ));
            return Ok(None);
        };
        Ok(Some((odometer, snapshot.captured_at)))
    }
}
