//! Tesla account credentials, tokens encrypted at rest

use super::{encode_ts, ts_column, Database};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

#[derive(Debug, Clone)]
pub struct CredentialRow {
    pub id: i64,
    pub email: String,
    /// AES-256-GCM ciphertext, hex encoded
    pub access_token: String,
    /// AES-256-GCM ciphertext, hex encoded
    pub refresh_token: String,
    pub salt: String,
    pub nonce: String,
    pub token_expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const COLUMNS: &str = "id, email, access_token, refresh_token, salt, nonce, \
     token_expires_at, created_at, updated_at";

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CredentialRow> {
    Ok(CredentialRow {
        id: row.get(0)?,
        email: row.get(1)?,
        access_token: row.get(2)?,
        refresh_token: row.get(3)?,
        salt: row.get(4)?,
        nonce: row.get(5)?,
        token_expires_at: ts_column(row, 6)?,
        created_at: ts_column(row, 7)?,
        updated_at: ts_column(row, 8)?,
    })
}

#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
}

impl CredentialStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert credentials for an account, replacing tokens if the email
    /// already exists. The row id is stable across re-logins so linked
    /// vehicles keep their association.
    pub fn upsert(
        &self,
        email: &str,
        access_token: &str,
        refresh_token: &str,
        salt: &str,
        nonce: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<CredentialRow> {
        let now = encode_ts(Utc::now());
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credentials \
                 (email, access_token, refresh_token, salt, nonce, token_expires_at, \
                  created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                 ON CONFLICT(email) DO UPDATE SET \
                    access_token = excluded.access_token, \
                    refresh_token = excluded.refresh_token, \
                    salt = excluded.salt, \
                    nonce = excluded.nonce, \
                    token_expires_at = excluded.token_expires_at, \
                    updated_at = excluded.updated_at",
                params![
                    email,
                    access_token,
                    refresh_token,
                    salt,
                    nonce,
                    encode_ts(token_expires_at),
                    now,
                ],
            )?;

            let row = conn.query_row(
                &format!("SELECT {} FROM credentials WHERE email = ?1", COLUMNS),
                params![email],
                map_row,
            )?;
            Ok(row)
        })
    }

    /// Replace the tokens of an existing account after a refresh.
    pub fn update_tokens(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: &str,
        salt: &str,
        nonce: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE credentials SET \
                    access_token = ?2, refresh_token = ?3, salt = ?4, nonce = ?5, \
                    token_expires_at = ?6, updated_at = ?7 \
                 WHERE id = ?1",
                params![
                    id,
                    access_token,
                    refresh_token,
                    salt,
                    nonce,
                    encode_ts(token_expires_at),
                    encode_ts(Utc::now()),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get(&self, id: i64) -> Result<Option<CredentialRow>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM credentials WHERE id = ?1", COLUMNS),
                    params![id],
                    map_row,
                )
                .ok();
            Ok(row)
        })
    }

    pub fn get_by_email(&self, email: &str) -> Result<Option<CredentialRow>> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {} FROM credentials WHERE email = ?1", COLUMNS),
                    params![email],
                    map_row,
                )
                .ok();
            Ok(row)
        })
    }

    pub fn list(&self) -> Result<Vec<CredentialRow>> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM credentials ORDER BY email", COLUMNS))?;
            let rows = stmt
                .query_map([], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Accounts whose token expires at or before the given instant.
    pub fn expiring_before(&self, deadline: DateTime<Utc>) -> Result<Vec<CredentialRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM credentials WHERE token_expires_at <= ?1 ORDER BY email",
                COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![encode_ts(deadline)], map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        self.db.with_conn(|conn| {
            let affected = conn.execute("DELETE FROM credentials WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }
}
