//! Token lifecycle for stored accounts
//!
//! Access and refresh tokens are never persisted in the clear. Every write
//! derives a fresh salt and nonce, so a re-login or refresh rotates the
//! whole ciphertext.

use crate::crypt;
use crate::error::{FiacreError, Result};
use crate::logging::{get_logger, StructuredLogger};
use crate::store::credentials::CredentialRow;
use crate::store::CredentialStore;
use crate::tesla::VehicleApi;
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Refresh anything that expires within the next scheduler interval plus
/// a little slack.
const REFRESH_HORIZON_MINUTES: i64 = 2 * 60 + 5;

pub struct TokenStore {
    credentials: CredentialStore,
    api: Arc<dyn VehicleApi>,
    secret_key: Option<String>,
    logger: StructuredLogger,
}

impl TokenStore {
    pub fn new(
        credentials: CredentialStore,
        api: Arc<dyn VehicleApi>,
        secret_key: Option<String>,
    ) -> Self {
        Self {
            credentials,
            api,
            secret_key,
            logger: get_logger("tokens"),
        }
    }

    fn secret(&self) -> Result<&str> {
        self.secret_key
            .as_deref()
            .ok_or_else(|| FiacreError::crypto("secret key is not configured"))
    }

    /// Complete a PKCE login and store the encrypted tokens for `email`.
    pub async fn login(&self, email: &str, code: &str, code_verifier: &str) -> Result<CredentialRow> {
        let pair = self.api.exchange_code(code, code_verifier).await?;

        let secret = self.secret()?;
        let salt = crypt::generate_salt();
        let nonce = crypt::generate_nonce();
        let access = crypt::encrypt(&pair.access_token, secret, &salt, &nonce)?;
        let refresh = crypt::encrypt(&pair.refresh_token, secret, &salt, &nonce)?;
        let expires_at = Utc::now() + Duration::seconds(pair.expires_in);

        let row = self
            .credentials
            .upsert(email, &access, &refresh, &salt, &nonce, expires_at)?;
        self.logger.info(&format!(
            "stored tokens for {}, valid until {}",
            email, expires_at
        ));
        Ok(row)
    }

    /// Refresh one account's tokens in place.
    pub async fn refresh(&self, credential: &CredentialRow) -> Result<()> {
        let secret = self.secret()?;
        let refresh_plain = crypt::decrypt(
            &credential.refresh_token,
            secret,
            &credential.salt,
            &credential.nonce,
        )?;

        let pair = self.api.refresh_token(&refresh_plain).await?;

        let salt = crypt::generate_salt();
        let nonce = crypt::generate_nonce();
        let access = crypt::encrypt(&pair.access_token, secret, &salt, &nonce)?;
        let refresh = crypt::encrypt(&pair.refresh_token, secret, &salt, &nonce)?;
        let expires_at = Utc::now() + Duration::seconds(pair.expires_in);

        self.credentials
            .update_tokens(credential.id, &access, &refresh, &salt, &nonce, expires_at)?;
        self.logger.info(&format!(
            "refreshed tokens for {}, valid until {}",
            credential.email, expires_at
        ));
        Ok(())
    }

    /// Refresh every account whose token expires within the horizon.
    /// Failures are logged and do not stop the sweep.
    pub async fn refresh_expiring(&self) -> Result<usize> {
        let deadline = Utc::now() + Duration::minutes(REFRESH_HORIZON_MINUTES);
        let due = self.credentials.expiring_before(deadline)?;

        let mut refreshed = 0;
        for credential in &due {
            match self.refresh(credential).await {
                Ok(()) => refreshed += 1,
                Err(e) => self.logger.error(&format!(
                    "token refresh failed for {}: {}",
                    credential.email, e
                )),
            }
        }
        Ok(refreshed)
    }

    /// Decrypt the stored access token of an account.
    pub fn access_token(&self, credential: &CredentialRow) -> Result<String> {
        crypt::decrypt(
            &credential.access_token,
            self.secret()?,
            &credential.salt,
            &credential.nonce,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;
    use crate::tesla::TokenPair;
    use serde_json::Value;

    struct StaticApi {
        pair: TokenPair,
    }

    #[async_trait::async_trait]
    impl VehicleApi for StaticApi {
        async fn exchange_code(&self, _code: &str, _verifier: &str) -> Result<TokenPair> {
            Ok(self.pair.clone())
        }

        async fn refresh_token(&self, refresh_token: &str) -> Result<TokenPair> {
            assert_eq!(refresh_token, "cba321");
            Ok(TokenPair {
                access_token: "abc9999".to_string(),
                refresh_token: "cba999".to_string(),
                expires_in: 3_888_000,
            })
        }

        async fn list_vehicles(&self, _t: &str) -> Result<Vec<crate::tesla::VehicleListing>> {
            Ok(Vec::new())
        }

        async fn wake_up(&self, _t: &str, _id: i64) -> Result<String> {
            Ok("online".to_string())
        }

        async fn is_mobile_enabled(&self, _t: &str, _id: i64) -> Result<bool> {
            Ok(true)
        }

        async fn vehicle_data(&self, _t: &str, _id: i64) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn state_section(
            &self,
            _t: &str,
            _id: i64,
            _s: crate::tesla::StateSection,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn command(
            &self,
            _t: &str,
            _id: i64,
            _c: &crate::tesla::VehicleCommand,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn nearby_charging_sites(&self, _t: &str, _id: i64) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn token_store() -> (TokenStore, CredentialStore) {
        let db = Database::in_memory().unwrap();
        let credentials = CredentialStore::new(db);
        let api = Arc::new(StaticApi {
            pair: TokenPair {
                access_token: "abc1234".to_string(),
                refresh_token: "cba321".to_string(),
                expires_in: 7_776_000,
            },
        });
        (
            TokenStore::new(credentials.clone(), api, Some("test-secret".to_string())),
            credentials,
        )
    }

    #[tokio::test]
    async fn test_login_encrypts_tokens_at_rest() {
        let (store, credentials) = token_store();
        let row = store.login("owner@example.com", "code", "verifier").await.unwrap();

        assert_ne!(row.access_token, "abc1234");
        assert_ne!(row.refresh_token, "cba321");
        assert_eq!(store.access_token(&row).unwrap(), "abc1234");

        let stored = credentials.get_by_email("owner@example.com").unwrap().unwrap();
        assert_eq!(stored.access_token, row.access_token);
    }

    #[tokio::test]
    async fn test_refresh_rotates_salt_and_nonce() {
        let (store, credentials) = token_store();
        let row = store.login("owner@example.com", "code", "verifier").await.unwrap();

        store.refresh(&row).await.unwrap();

        let updated = credentials.get(row.id).unwrap().unwrap();
        assert_ne!(updated.salt, row.salt);
        assert_ne!(updated.nonce, row.nonce);
        assert_eq!(store.access_token(&updated).unwrap(), "abc9999");
    }

    #[tokio::test]
    async fn test_refresh_expiring_only_touches_due_accounts() {
        let (store, credentials) = token_store();
        let soon = store.login("soon@example.com", "code", "verifier").await.unwrap();
        store.login("later@example.com", "code", "verifier").await.unwrap();

        // Pull one account's expiry inside the horizon
        credentials
            .update_tokens(
                soon.id,
                &soon.access_token,
                &soon.refresh_token,
                &soon.salt,
                &soon.nonce,
                Utc::now() + Duration::hours(1),
            )
            .unwrap();

        let refreshed = store.refresh_expiring().await.unwrap();
        assert_eq!(refreshed, 1);

        let touched = credentials.get(soon.id).unwrap().unwrap();
        assert_eq!(store.access_token(&touched).unwrap(), "abc9999");
    }

    #[tokio::test]
    async fn test_missing_secret_key_is_an_error() {
        let db = Database::in_memory().unwrap();
        let api = Arc::new(StaticApi {
            pair: TokenPair {
                access_token: "a".to_string(),
                refresh_token: "b".to_string(),
                expires_in: 60,
            },
        });
        let store = TokenStore::new(CredentialStore::new(db), api, None);

        let err = store.login("owner@example.com", "code", "verifier").await;
        assert!(matches!(err, Err(FiacreError::Crypto { .. })));
    }
}
