//! PKCE helpers for the SSO login flow
//!
//! The flow mirrors the official app: the operator opens the authorize URL,
//! signs in, lands on the void callback page and pastes its URL back. The
//! code is then exchanged server side.

use crate::crypt::random_string;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

pub const REDIRECT_URI: &str = "https://auth.tesla.com/void/callback";
const REDIRECT_URI_ENCODED: &str = "https%3A%2F%2Fauth.tesla.com%2Fvoid%2Fcallback";

pub fn generate_code_verifier() -> String {
    random_string(86)
}

pub fn generate_state() -> String {
    random_string(10)
}

/// S256 challenge derived from the verifier.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

pub fn authorize_url(auth_host: &str, challenge: &str, state: &str, login_hint: &str) -> String {
    format!(
        "{}/oauth2/v3/authorize?client_id=ownerapi&code_challenge={}&\
         code_challenge_method=S256&redirect_uri={}&response_type=code&\
         scope=openid%20email%20offline_access&state={}&login_hint={}",
        auth_host, challenge, REDIRECT_URI_ENCODED, state, login_hint
    )
}

/// Pull one query parameter out of a pasted callback URL.
pub fn callback_param(url: &str, name: &str) -> Option<String> {
    let query = match url.split_once('?') {
        Some((_, query)) => query,
        None => url,
    };
    query.split('&').find_map(|pair| {
        pair.split_once('=')
            .filter(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    })
}
