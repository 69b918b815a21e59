//! Command compositions shared by the renter and manage surfaces
//!
//! Commands are not guaranteed synchronous on the vehicle side, so every
//! composition wakes first, issues the command, then persists a fresh
//! snapshot to confirm the effect.

use crate::error::{FiacreError, Result};
use crate::fetch::Fetcher;
use crate::logging::{get_logger, StructuredLogger};
use crate::store::vehicles::VehicleRow;
use crate::store::CredentialStore;
use crate::tesla::{StateSection, VehicleApi, VehicleCommand};
use crate::tokens::TokenStore;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub struct VehicleOps {
    credentials: CredentialStore,
    tokens: Arc<TokenStore>,
    api: Arc<dyn VehicleApi>,
    fetcher: Arc<Fetcher>,
    wake_settle: Duration,
    logger: StructuredLogger,
}

impl VehicleOps {
    pub fn new(
        credentials: CredentialStore,
        tokens: Arc<TokenStore>,
        api: Arc<dyn VehicleApi>,
        fetcher: Arc<Fetcher>,
        wake_settle: Duration,
    ) -> Self {
        Self {
            credentials,
            tokens,
            api,
            fetcher,
            wake_settle,
            logger: get_logger("ops"),
        }
    }

    fn access_token_for(&self, vehicle: &VehicleRow) -> Result<String> {
        let credentials_id = vehicle
            .credentials_id
            .ok_or_else(|| FiacreError::validation("vehicle", "not linked to any credentials"))?;
        let credential = self.credentials.get(credentials_id)?.ok_or_else(|| {
            FiacreError::store(format!("credentials {} not found", credentials_id))
        })?;
        self.tokens.access_token(&credential)
    }

    /// Wake the vehicle; when it does not report online immediately, give it
    /// the settle delay before the caller proceeds.
    pub async fn ensure_awake(&self, vehicle: &VehicleRow) -> Result<()> {
        let access_token = self.access_token_for(vehicle)?;
        let state = self.api.wake_up(&access_token, vehicle.remote_id).await?;
        if state != "online" {
            self.logger.debug(&format!(
                "vehicle {} is {}, waiting for it to come online",
                vehicle.id, state
            ));
            tokio::time::sleep(self.wake_settle).await;
        }
        Ok(())
    }

    /// Wake, run the command, then fetch and store fresh state. A failing
    /// post-command fetch does not fail the command.
    pub async fn execute(&self, vehicle: &VehicleRow, command: &VehicleCommand) -> Result<Value> {
        self.ensure_awake(vehicle).await?;
        let access_token = self.access_token_for(vehicle)?;
        let result = self
            .api
            .command(&access_token, vehicle.remote_id, command)
            .await?;
        self.logger.info(&format!(
            "vehicle {} command {} accepted",
            vehicle.id,
            command.endpoint()
        ));

        if let Err(e) = self.fetcher.fetch_vehicle(vehicle, false).await {
            self.logger.info(&format!(
                "post-command fetch failed for vehicle {}: {}",
                vehicle.id, e
            ));
        }
        Ok(result)
    }

    /// Live read of one state section. Older firmware answers the granular
    /// endpoint even when the full document lacks the matching sub-key.
    pub async fn read_section(&self, vehicle: &VehicleRow, section: StateSection) -> Result<Value> {
        let access_token = self.access_token_for(vehicle)?;
        self.api
            .state_section(&access_token, vehicle.remote_id, section)
            .await
    }
}
