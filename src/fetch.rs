//! Telemetry polling
//!
//! Routine polls must not keep a parked vehicle awake, so the policy looks
//! at the trailing window of snapshots and skips the fetch when nothing can
//! have changed. A boundary or an explicit wakeup bypasses the policy.

use crate::error::{FiacreError, Result};
use crate::logging::{get_logger, StructuredLogger};
use crate::store::credentials::CredentialRow;
use crate::store::vehicles::VehicleRow;
use crate::store::{CredentialStore, SnapshotStore, VehicleStore};
use crate::telemetry::StateDocument;
use crate::tesla::{VehicleApi, VehicleListing};
use crate::tokens::TokenStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Vehicles fall asleep after 10-15 minutes of inactivity
pub const RECENT_WINDOW_MINUTES: i64 = 15;

/// How long a woken vehicle gets before the retry fetch
pub const WAKE_SETTLE: Duration = Duration::from_secs(10);

/// Skip decision over the trailing snapshot window. An empty window never
/// skips; a single snapshot that is moving, unlocked, offline or charging
/// forces a fetch.
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub all_stopped: bool,
    pub all_locked: bool,
    pub all_online: bool,
    pub none_charging: bool,
    window_len: usize,
}

impl FetchPolicy {
    pub fn evaluate(docs: &[StateDocument]) -> Self {
        Self {
            all_stopped: docs.iter().all(|d| !d.is_moving()),
            all_locked: docs.iter().all(|d| d.is_locked() == Some(true)),
            all_online: docs.iter().all(|d| d.is_online()),
            none_charging: docs.iter().all(|d| !d.is_charging()),
            window_len: docs.len(),
        }
    }

    pub fn should_skip(&self) -> bool {
        self.window_len > 0
            && self.all_stopped
            && self.all_locked
            && self.all_online
            && self.none_charging
    }
}

pub struct Fetcher {
    vehicles: VehicleStore,
    snapshots: SnapshotStore,
    credentials: CredentialStore,
    tokens: Arc<TokenStore>,
    api: Arc<dyn VehicleApi>,
    wake_settle: Duration,
    logger: StructuredLogger,
}

impl Fetcher {
    pub fn new(
        vehicles: VehicleStore,
        snapshots: SnapshotStore,
        credentials: CredentialStore,
        tokens: Arc<TokenStore>,
        api: Arc<dyn VehicleApi>,
        wake_settle: Duration,
    ) -> Self {
        Self {
            vehicles,
            snapshots,
            credentials,
            tokens,
            api,
            wake_settle,
            logger: get_logger("fetch"),
        }
    }

    /// Poll every active vehicle, or just one when `only_vehicle` is given.
    /// A failing vehicle is logged and does not stop the rest.
    pub async fn fetch_all(&self, wakeup: bool, only_vehicle: Option<i64>) -> Result<()> {
        let mut listings = ListingCache::default();
        for vehicle in self.vehicles.list_active()? {
            if let Some(only) = only_vehicle
                && vehicle.id != only
            {
                continue;
            }

            if !wakeup && self.should_skip(&vehicle)? {
                continue;
            }

            if let Err(e) = self.fetch_vehicle_inner(&vehicle, wakeup, &mut listings).await {
                // A missed routine poll is not fatal, the next pass retries
                match e {
                    FiacreError::Api { .. } => self
                        .logger
                        .info(&format!("poll failed for vehicle {}: {}", vehicle.id, e)),
                    other => self
                        .logger
                        .error(&format!("fetch failed for vehicle {}: {}", vehicle.id, other)),
                }
            }
        }
        Ok(())
    }

    /// Fetch one vehicle now, with the full fallback chain.
    pub async fn fetch_vehicle(&self, vehicle: &VehicleRow, wakeup: bool) -> Result<()> {
        let mut listings = ListingCache::default();
        self.fetch_vehicle_inner(vehicle, wakeup, &mut listings).await
    }

    fn should_skip(&self, vehicle: &VehicleRow) -> Result<bool> {
        let since = Utc::now() - chrono::Duration::minutes(RECENT_WINDOW_MINUTES);
        let window = self.snapshots.recent_since(vehicle.id, since)?;
        let docs: Vec<StateDocument> = window
            .iter()
            .filter_map(|row| StateDocument::from_value(&row.data).ok())
            .collect();

        let policy = FetchPolicy::evaluate(&docs);
        self.logger.debug(&format!(
            "vehicle {} window={} all_stopped={} all_locked={} all_online={} none_charging={}",
            vehicle.id,
            window.len(),
            policy.all_stopped,
            policy.all_locked,
            policy.all_online,
            policy.none_charging
        ));

        let skip = policy.should_skip();
        if skip {
            self.logger
                .debug(&format!("vehicle {} skip, nothing should have changed", vehicle.id));
        }
        Ok(skip)
    }

    async fn fetch_vehicle_inner(
        &self,
        vehicle: &VehicleRow,
        wakeup: bool,
        listings: &mut ListingCache,
    ) -> Result<()> {
        let credentials_id = vehicle.credentials_id.ok_or_else(|| {
            FiacreError::validation("vehicle", "not linked to any credentials")
        })?;
        let credential = self.credentials.get(credentials_id)?.ok_or_else(|| {
            FiacreError::store(format!("credentials {} not found", credentials_id))
        })?;
        let access_token = self.tokens.access_token(&credential)?;

        match self.fetch_and_store(vehicle, &access_token).await {
            Ok(()) => return Ok(()),
            Err(FiacreError::Api { path, message }) => {
                self.logger
                    .debug(&format!("vehicle {}: {}: {}", vehicle.id, path, message));
            }
            Err(e) => return Err(e),
        }

        if wakeup && self.wake_and_retry(vehicle, &access_token).await? {
            return Ok(());
        }

        // Degraded fallback: the listing still tells us online/offline
        self.store_listing_snapshot(vehicle, &credential, &access_token, listings)
            .await
    }

    async fn fetch_and_store(&self, vehicle: &VehicleRow, access_token: &str) -> Result<()> {
        let data = self.api.vehicle_data(access_token, vehicle.remote_id).await?;
        self.snapshots.append(vehicle.id, Utc::now(), &data)?;
        Ok(())
    }

    /// Returns whether the retry produced a snapshot.
    async fn wake_and_retry(&self, vehicle: &VehicleRow, access_token: &str) -> Result<bool> {
        match self.api.wake_up(access_token, vehicle.remote_id).await {
            Ok(state) => {
                self.logger
                    .debug(&format!("vehicle {} woken, state={}", vehicle.id, state));
            }
            Err(e) => {
                self.logger
                    .debug(&format!("vehicle {} wake failed: {}", vehicle.id, e));
                return Ok(false);
            }
        }
        tokio::time::sleep(self.wake_settle).await;

        match self.fetch_and_store(vehicle, access_token).await {
            Ok(()) => Ok(true),
            Err(FiacreError::Api { path, message }) => {
                self.logger.debug(&format!(
                    "vehicle {} still unavailable: {}: {}",
                    vehicle.id, path, message
                ));
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn store_listing_snapshot(
        &self,
        vehicle: &VehicleRow,
        credential: &CredentialRow,
        access_token: &str,
        listings: &mut ListingCache,
    ) -> Result<()> {
        if !listings.0.contains_key(&credential.id) {
            // This call does not keep the vehicle awake
            let fetched = self.api.list_vehicles(access_token).await?;
            listings.0.insert(credential.id, fetched);
        }

        let entry = listings.0[&credential.id]
            .iter()
            .find(|l| l.remote_id() == Some(vehicle.remote_id));
        match entry {
            Some(entry) => {
                self.snapshots.append(vehicle.id, Utc::now(), &entry.0)?;
                self.logger
                    .debug(&format!("vehicle {} stored listing snapshot", vehicle.id));
            }
            None => {
                self.logger
                    .warn(&format!("vehicle {} missing from account listing", vehicle.id));
            }
        }
        Ok(())
    }
}

/// Listings fetched once per account within a single polling pass.
#[derive(Default)]
struct ListingCache(HashMap<i64, Vec<VehicleListing>>);
