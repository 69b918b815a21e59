//! HTTP client for the owner API

use crate::config::TeslaConfig;
use crate::error::{FiacreError, Result};
use crate::logging::{get_logger, StructuredLogger};
use crate::tesla::auth;
use crate::tesla::types::{StateSection, TokenPair, VehicleCommand, VehicleListing};
use crate::tesla::VehicleApi;
use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde_json::{json, Value};

pub struct TeslaClient {
    http: reqwest::Client,
    auth_host: String,
    api_host: String,
    client_id: String,
    client_secret: String,
    logger: StructuredLogger,
}

impl TeslaClient {
    pub fn new(config: &TeslaConfig) -> Result<Self> {
        // Wake and data fetches on a sleepy car routinely take ten seconds
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            auth_host: config.auth_host.trim_end_matches('/').to_string(),
            api_host: config.api_host.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            logger: get_logger("teslaapi"),
        })
    }

    /// Perform an authenticated owner API request and unwrap the standard
    /// `{"response": ...}` envelope.
    async fn request(
        &self,
        method: Method,
        path: &str,
        access_token: &str,
        body: Option<&Value>,
    ) -> Result<Value> {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.api_host, path))
            .header(AUTHORIZATION, format!("Bearer {}", access_token));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        self.logger.debug(&format!(
            "req={}, status={}, resp={}",
            path,
            status.as_u16(),
            text.replace('\n', " ")
        ));

        if !status.is_success() {
            return Err(FiacreError::api(
                path.to_string(),
                format!("returned {} ({})", status.as_u16(), text),
            ));
        }

        let parsed: Value = serde_json::from_str(&text)?;
        if let Some(error) = parsed.get("error") {
            let message = match error.as_str() {
                Some(message) => message.to_string(),
                None => error.to_string(),
            };
            return Err(FiacreError::api(path.to_string(), message));
        }

        match parsed.get("response") {
            Some(response) => Ok(response.clone()),
            None => Err(FiacreError::api(
                path.to_string(),
                "missing response envelope".to_string(),
            )),
        }
    }

    async fn sso_token_request(&self, body: &Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}/oauth2/v3/token", self.auth_host))
            .json(body)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    /// Second OAuth step: trade the SSO bearer token for an owner API token.
    async fn owner_token_request(&self, sso_access_token: &str) -> Result<Value> {
        let body = json!({
            "grant_type": "urn:ietf:params:oauth:grant-type:jwt-bearer",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
        });
        let response = self
            .http
            .post(format!("{}/oauth/token", self.api_host))
            .header(AUTHORIZATION, format!("Bearer {}", sso_access_token))
            .json(&body)
            .send()
            .await?;
        Ok(response.json().await?)
    }

    async fn complete_token_exchange(&self, sso: Value, context: &str) -> Result<TokenPair> {
        let (Some(sso_access), Some(sso_refresh)) = (
            sso.get("access_token").and_then(Value::as_str),
            sso.get("refresh_token").and_then(Value::as_str),
        ) else {
            let message = format!("{} not possible, response={}", context, sso);
            self.logger.error(&message);
            return Err(FiacreError::auth(message));
        };

        let owner = self.owner_token_request(sso_access).await?;
        match (
            owner.get("access_token").and_then(Value::as_str),
            owner.get("expires_in").and_then(Value::as_i64),
        ) {
            (Some(access_token), Some(expires_in)) => Ok(TokenPair {
                access_token: access_token.to_string(),
                refresh_token: sso_refresh.to_string(),
                expires_in,
            }),
            _ => {
                let message = format!("{} not possible, response={}", context, owner);
                self.logger.error(&message);
                Err(FiacreError::auth(message))
            }
        }
    }
}

#[async_trait::async_trait]
impl VehicleApi for TeslaClient {
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenPair> {
        let body = json!({
            "grant_type": "authorization_code",
            "client_id": "ownerapi",
            "code": code,
            "code_verifier": code_verifier,
            "redirect_uri": auth::REDIRECT_URI,
        });
        self.logger.debug(&format!("login on {}", self.auth_host));
        let sso = self.sso_token_request(&body).await?;
        self.complete_token_exchange(sso, "login").await
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
        let body = json!({
            "grant_type": "refresh_token",
            "client_id": "ownerapi",
            "refresh_token": refresh_token,
            "scope": "openid email offline_access",
        });
        let sso = self.sso_token_request(&body).await?;
        self.complete_token_exchange(sso, "token refresh").await
    }

    async fn list_vehicles(&self, access_token: &str) -> Result<Vec<VehicleListing>> {
        let response = self
            .request(Method::GET, "/api/1/vehicles", access_token, None)
            .await?;
        let entries = response.as_array().cloned().unwrap_or_default();
        Ok(entries.into_iter().map(VehicleListing).collect())
    }

    async fn wake_up(&self, access_token: &str, remote_id: i64) -> Result<String> {
        let path = format!("/api/1/vehicles/{}/wake_up", remote_id);
        let response = self.request(Method::POST, &path, access_token, None).await?;
        match response.get("state").and_then(Value::as_str) {
            Some(state) => Ok(state.to_string()),
            None => Err(FiacreError::api(
                path,
                "wake_up response without state".to_string(),
            )),
        }
    }

    async fn is_mobile_enabled(&self, access_token: &str, remote_id: i64) -> Result<bool> {
        let path = format!("/api/1/vehicles/{}/mobile_enabled", remote_id);
        let response = self.request(Method::GET, &path, access_token, None).await?;
        Ok(response.as_bool().unwrap_or(false))
    }

    async fn vehicle_data(&self, access_token: &str, remote_id: i64) -> Result<Value> {
        let path = format!("/api/1/vehicles/{}/vehicle_data", remote_id);
        self.request(Method::GET, &path, access_token, None).await
    }

    async fn state_section(
        &self,
        access_token: &str,
        remote_id: i64,
        section: StateSection,
    ) -> Result<Value> {
        let path = format!(
            "/api/1/vehicles/{}/data_request/{}",
            remote_id,
            section.as_path()
        );
        self.request(Method::GET, &path, access_token, None).await
    }

    async fn command(
        &self,
        access_token: &str,
        remote_id: i64,
        command: &VehicleCommand,
    ) -> Result<Value> {
        let path = format!(
            "/api/1/vehicles/{}/command/{}",
            remote_id,
            command.endpoint()
        );
        let body = command.body();
        self.request(Method::POST, &path, access_token, body.as_ref())
            .await
    }

    async fn nearby_charging_sites(&self, access_token: &str, remote_id: i64) -> Result<Value> {
        let path = format!("/api/1/vehicles/{}/nearby_charging_sites", remote_id);
        self.request(Method::GET, &path, access_token, None).await
    }
}
