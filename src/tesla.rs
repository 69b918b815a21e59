//! Tesla owner API integration

pub mod auth;
pub mod client;
pub mod types;

pub use client::TeslaClient;
pub use types::{StateSection, TokenPair, Trunk, VehicleCommand, VehicleListing};

use crate::error::Result;
use serde_json::Value;

/// Everything the application asks of the owner API. Callers hand in a
/// decrypted access token; session handling stays in the token layer.
#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// Exchange a PKCE authorization code for tokens.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenPair>;

    /// Trade a refresh token for a fresh token pair.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair>;

    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<VehicleListing>>;

    /// Ask the vehicle to wake up. Returns the state it reports, which is
    /// usually still "asleep" right after the call.
    async fn wake_up(&self, access_token: &str, remote_id: i64) -> Result<String>;

    async fn is_mobile_enabled(&self, access_token: &str, remote_id: i64) -> Result<bool>;

    /// Full state document. Only works while the vehicle is online.
    async fn vehicle_data(&self, access_token: &str, remote_id: i64) -> Result<Value>;

    /// Granular state fetch for firmware that does not serve the section
    /// inside the full document.
    async fn state_section(
        &self,
        access_token: &str,
        remote_id: i64,
        section: StateSection,
    ) -> Result<Value>;

    /// Send a command and return its raw result object.
    async fn command(
        &self,
        access_token: &str,
        remote_id: i64,
        command: &VehicleCommand,
    ) -> Result<Value>;

    async fn nearby_charging_sites(&self, access_token: &str, remote_id: i64) -> Result<Value>;
}
