//! WAMP challenge-response authentication (WAMP-CRA).
//!
//! The router sends a nonce, optionally with PBKDF2 parameters. The client
//! proves it knows the secret by returning an HMAC-SHA256 over the nonce:
//!
//! ```text
//! salt present:  key = base64(PBKDF2-HMAC-SHA256(secret, salt, iterations, keylen))
//! salt absent:   key = secret
//! signature      = base64(HMAC-SHA256(key, challenge))
//! ```
//!
//! Note that with a salt the HMAC key is the base64 *text* of the derived
//! key, not the raw derived bytes. Routers compute it the same way.
//!
//! Everything here is a pure function of its inputs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use dbbridge_protocol::Dict;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::SessionError;

/// The only challenge method this crate can answer.
pub const WAMPCRA: &str = "wampcra";

/// PBKDF2 iteration count used when the challenge doesn't name one.
pub const DEFAULT_ITERATIONS: u32 = 1000;

/// Derived key length in bytes used when the challenge doesn't name one.
pub const DEFAULT_KEYLEN: usize = 32;

/// Largest iteration count a router may ask for. Derivation runs on the
/// task serving the session.
pub const MAX_ITERATIONS: u32 = 100_000;

/// Largest derived key length, in bytes, a router may ask for.
pub const MAX_KEYLEN: usize = 1024;

/// A challenge received during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub method: String,
    pub salt: Option<String>,
    pub iterations: Option<u32>,
    pub keylen: Option<usize>,
    /// The nonce to sign.
    pub challenge: String,
}

impl AuthChallenge {
    /// A `wampcra` challenge with no key derivation.
    pub fn wampcra(challenge: impl Into<String>) -> Self {
        Self {
            method: WAMPCRA.into(),
            salt: None,
            iterations: None,
            keylen: None,
            challenge: challenge.into(),
        }
    }

    /// Reads a challenge from the `extra` dictionary of a CHALLENGE
    /// message.
    ///
    /// For methods other than `wampcra` the extra dictionary is not
    /// inspected and only `method` is meaningful.
    ///
    /// # Errors
    /// [`SessionError::InvalidChallenge`] if a `wampcra` challenge lacks
    /// its nonce or carries non-numeric derivation parameters, and for a
    /// salted challenge whose parameters fall outside `1..=MAX_ITERATIONS`
    /// and `1..=MAX_KEYLEN`.
    pub fn from_extra(method: &str, extra: &Dict) -> Result<Self, SessionError> {
        if method != WAMPCRA {
            return Ok(Self {
                method: method.into(),
                salt: None,
                iterations: None,
                keylen: None,
                challenge: String::new(),
            });
        }

        let challenge = extra
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::InvalidChallenge("missing nonce".into()))?
            .to_string();
        let salt = extra.get("salt").and_then(Value::as_str).map(str::to_string);
        let iterations = number_field(extra, "iterations")?
            .map(u32::try_from)
            .transpose()
            .map_err(|_| SessionError::InvalidChallenge("iterations out of range".into()))?;
        let keylen = number_field(extra, "keylen")?
            .map(usize::try_from)
            .transpose()
            .map_err(|_| SessionError::InvalidChallenge("keylen out of range".into()))?;

        let parsed = Self {
            method: method.into(),
            salt,
            iterations,
            keylen,
            challenge,
        };
        if parsed.salt.is_some() {
            parsed.derivation()?;
        }
        Ok(parsed)
    }

    /// The PBKDF2 parameters to use, defaults filled in.
    fn derivation(&self) -> Result<(u32, usize), SessionError> {
        let iterations = self.iterations.unwrap_or(DEFAULT_ITERATIONS);
        let keylen = self.keylen.unwrap_or(DEFAULT_KEYLEN);
        if !(1..=MAX_ITERATIONS).contains(&iterations) {
            return Err(SessionError::InvalidChallenge(format!(
                "iterations must be between 1 and {MAX_ITERATIONS}, got {iterations}"
            )));
        }
        if !(1..=MAX_KEYLEN).contains(&keylen) {
            return Err(SessionError::InvalidChallenge(format!(
                "keylen must be between 1 and {MAX_KEYLEN}, got {keylen}"
            )));
        }
        Ok((iterations, keylen))
    }
}

fn number_field(extra: &Dict, key: &str) -> Result<Option<u64>, SessionError> {
    match extra.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| SessionError::InvalidChallenge(format!("{key} must be a positive integer"))),
    }
}

/// Derives a salted key, returned base64-encoded.
pub fn derive_key(secret: &str, salt: &str, iterations: u32, keylen: usize) -> String {
    let mut key = vec![0u8; keylen];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt.as_bytes(), iterations, &mut key);
    STANDARD.encode(key)
}

/// Signs `challenge` with `key`, returned base64-encoded.
///
/// # Errors
/// HMAC accepts keys of any length, so this only fails if the `hmac`
/// crate rejects the key, reported as [`SessionError::InvalidChallenge`].
pub fn compute_signature(key: &[u8], challenge: &str) -> Result<String, SessionError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| SessionError::InvalidChallenge(e.to_string()))?;
    mac.update(challenge.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Answers a challenge with `secret`.
///
/// # Errors
/// [`SessionError::AuthMethodUnsupported`] for any method but `wampcra`,
/// [`SessionError::InvalidChallenge`] for out-of-range derivation
/// parameters.
pub fn sign(secret: &str, challenge: &AuthChallenge) -> Result<String, SessionError> {
    if challenge.method != WAMPCRA {
        return Err(SessionError::AuthMethodUnsupported(challenge.method.clone()));
    }
    match &challenge.salt {
        Some(salt) => {
            let (iterations, keylen) = challenge.derivation()?;
            let key = derive_key(secret, salt, iterations, keylen);
            compute_signature(key.as_bytes(), &challenge.challenge)
        }
        None => compute_signature(secret.as_bytes(), &challenge.challenge),
    }
}
