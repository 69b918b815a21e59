//! Account to vehicle reconciliation
//!
//! The account listing is the source of truth. Vehicles that drop out of it
//! are unlinked, never deleted, so their rental history and snapshots stay
//! queryable. A vehicle that moves between accounts is recognized by its
//! stable id and taken over instead of duplicated.

use crate::error::Result;
use crate::logging::{get_logger, StructuredLogger};
use crate::store::credentials::CredentialRow;
use crate::store::vehicles::NewVehicle;
use crate::store::{CredentialStore, SnapshotStore, VehicleStore};
use crate::telemetry::StateDocument;
use crate::tesla::VehicleApi;
use crate::tokens::TokenStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub struct VehicleRegistry {
    vehicles: VehicleStore,
    snapshots: SnapshotStore,
    credentials: CredentialStore,
    tokens: Arc<TokenStore>,
    api: Arc<dyn VehicleApi>,
    /// How long to give a woken vehicle before talking to it
    wake_settle: Duration,
    logger: StructuredLogger,
}

impl VehicleRegistry {
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
            logger: get_logger("registry"),
        }
    }

    /// Reconcile the stored vehicles of one account against its listing.
    pub async fn sync_account(&self, credential: &CredentialRow, wake: bool) -> Result<()> {
        let access_token = self.tokens.access_token(credential)?;
        let listings = self.api.list_vehicles(&access_token).await?;

        let mut existing: HashMap<i64, _> = self
            .vehicles
            .list_for_credentials(credential.id)?
            .into_iter()
            .map(|v| (v.vehicle_id, v))
            .collect();
        self.logger.debug(&format!(
            "account {} has {} stored, {} listed vehicles",
            credential.email,
            existing.len(),
            listings.len()
        ));

        for listing in &listings {
            let (Some(stable_id), Some(remote_id)) = (listing.stable_id(), listing.remote_id())
            else {
                self.logger
                    .warn(&format!("listing entry without ids: {}", listing.0));
                continue;
            };

            let mut vehicle = match existing.remove(&stable_id) {
                Some(vehicle) => vehicle,
                None => match self.vehicles.find_by_stable_id(stable_id)? {
                    Some(vehicle) => {
                        self.logger
                            .info(&format!("assigning vehicle {} from existing record", stable_id));
                        vehicle
                    }
                    None => {
                        self.logger.info(&format!("new vehicle {}", stable_id));
                        self.vehicles.insert(&NewVehicle {
                            remote_id,
                            vehicle_id: stable_id,
                            credentials_id: Some(credential.id),
                            linked: true,
                            display_name: String::new(),
                            vin: None,
                        })?
                    }
                },
            };

            vehicle.credentials_id = Some(credential.id);
            vehicle.linked = true;
            vehicle.remote_id = remote_id;
            vehicle.display_name = listing.display_name().unwrap_or("").to_string();
            vehicle.vin = listing.vin().map(str::to_string);
            self.vehicles.save(&vehicle)?;

            let mut state = listing.state().map(str::to_string);
            if state.as_deref() != Some("online") && wake {
                state = Some(self.api.wake_up(&access_token, remote_id).await?);
                tokio::time::sleep(self.wake_settle).await;
            }

            if state.as_deref() == Some("online") {
                // Not part of the state document, has to be asked separately
                vehicle.mobile_enabled =
                    Some(self.api.is_mobile_enabled(&access_token, remote_id).await?);

                let data = self.api.vehicle_data(&access_token, remote_id).await?;
                self.snapshots.append(vehicle.id, Utc::now(), &data)?;
                if let Ok(doc) = StateDocument::from_value(&data)
                    && let Some(config) = doc.vehicle_config
                {
                    vehicle.color = config.exterior_color;
                    vehicle.model = config.car_type;
                }
            } else if wake {
                self.logger
                    .warn(&format!("vehicle still not online {}", stable_id));
            }

            vehicle.state = state;
            self.vehicles.save(&vehicle)?;
        }

        // Whatever is left in the map no longer shows up in the listing
        for (stable_id, vehicle) in existing {
            self.logger.info(&format!("unlinking vehicle {}", stable_id));
            self.vehicles.unlink(vehicle.id)?;
        }

        Ok(())
    }

    /// Reconcile every account, then sweep rows whose account is gone.
    /// One failing account does not stop the others.
    pub async fn sync_all(&self, wake: bool) -> Result<()> {
        for credential in self.credentials.list()? {
            if let Err(e) = self.sync_account(&credential, wake).await {
                self.logger
                    .error(&format!("sync failed for {}: {}", credential.email, e));
            }
        }

        for vehicle in self.vehicles.list_linked_without_credentials()? {
            self.logger
                .info(&format!("unlinking global vehicle {}", vehicle.id));
            self.vehicles.unlink(vehicle.id)?;
        }

        Ok(())
    }
}
