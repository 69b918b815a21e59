//! Credential encryption at rest
//!
//! OAuth tokens are stored AES-256-GCM encrypted. The key is derived from the
//! configured secret with PBKDF2-HMAC-SHA256 and a per-credential salt; salt,
//! nonce and ciphertext travel as hex strings.

use crate::error::{FiacreError, Result};
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;

/// AES-256 key size in bytes
pub const KEY_SIZE: usize = 32;

/// Per-credential salt size in bytes
pub const SALT_SIZE: usize = 16;

/// AES-GCM nonce size in bytes
pub const NONCE_SIZE: usize = 12;

const PBKDF2_ROUNDS: u32 = 100_000;

/// Generate a fresh random salt as a hex string
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Generate a fresh random nonce as a hex string
pub fn generate_nonce() -> String {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    hex::encode(nonce)
}

/// Generate a random alphanumeric string, e.g. for OAuth verifiers and state
pub fn random_string(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
        .into_iter()
        .map(|b| CHARSET[(b as usize) % CHARSET.len()] as char)
        .collect()
}

fn derive_key(secret: &str, salt_hex: &str) -> Result<[u8; KEY_SIZE]> {
    let salt = decode_hex("salt", salt_hex)?;
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), &salt, PBKDF2_ROUNDS, &mut key);
    Ok(key)
}

fn decode_hex(what: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value).map_err(|e| FiacreError::crypto(format!("invalid {} hex: {}", what, e)))
}

fn parse_nonce(nonce_hex: &str) -> Result<[u8; NONCE_SIZE]> {
    let bytes = decode_hex("nonce", nonce_hex)?;
    bytes
        .try_into()
        .map_err(|_| FiacreError::crypto("nonce must be 12 bytes"))
}

/// Encrypt a plaintext string; returns the ciphertext as hex
pub fn encrypt(plaintext: &str, secret: &str, salt_hex: &str, nonce_hex: &str) -> Result<String> {
    let key = derive_key(secret, salt_hex)?;
    let cipher = Aes256Gcm::new(&key.into());
    let nonce = Nonce::from(parse_nonce(nonce_hex)?);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| FiacreError::crypto("encryption failed"))?;
    Ok(hex::encode(ciphertext))
}

/// Decrypt a hex ciphertext back to the plaintext string
pub fn decrypt(ciphertext_hex: &str, secret: &str, salt_hex: &str, nonce_hex: &str) -> Result<String> {
    let key = derive_key(secret, salt_hex)?;
    let cipher = Aes256Gcm::new(&key.into());
    let nonce = Nonce::from(parse_nonce(nonce_hex)?);

    let ciphertext = decode_hex("ciphertext", ciphertext_hex)?;
    let plaintext = cipher
        .decrypt(&nonce, ciphertext.as_ref())
        .map_err(|_| FiacreError::crypto("decryption failed"))?;
    String::from_utf8(plaintext).map_err(|e| FiacreError::crypto(e.to_string()))
}
