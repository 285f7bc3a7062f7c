//! HMAC signature verification for callbacks
//!
//! The sender signs the raw body (or `timestamp,body` when replay protection
//! is on) with a shared secret and puts the hex digest in a header. The
//! algorithm is fixed when the verifier is built, so a typo in the suite is
//! a configuration error rather than a failure on the first callback.

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use md5::Md5;
use serde::Deserialize;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512, Sha512_224, Sha512_256};
use sha3::{Sha3_224, Sha3_256, Sha3_384, Sha3_512};
use thiserror::Error;

use super::signal::Signal;

/// Header carrying the Unix timestamp when replay protection is enabled
pub const TIMESTAMP_HEADER: &str = "Convoy-Timestamp";

/// Maximum age of a signed timestamp, in seconds
pub const REPLAY_WINDOW_SECS: i64 = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("unsupported signature algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("signature invalid")]
    Invalid,

    #[error("replay attack timestamp {timestamp} is more than {window} seconds ago")]
    ReplayExpired { timestamp: i64, window: i64 },

    #[error("unable to decode {0}")]
    Decode(String),

    #[error("signature secret cannot be used as an hmac key")]
    InvalidKey,
}

/// Signature settings from the suite's callback section
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureConfig {
    pub secret: String,
    pub header: String,
    pub hash: String,
    #[serde(default, alias = "replay_protection")]
    pub replay_attacks: bool,
}

/// Hash functions usable as the HMAC inner hash
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
    Sha512_224,
    Sha512_256,
    Sha3_224,
    Sha3_256,
    Sha3_384,
    Sha3_512,
}

impl Algorithm {
    pub const ALL: [Algorithm; 12] = [
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha224,
        Algorithm::Sha256,
        Algorithm::Sha384,
        Algorithm::Sha512,
        Algorithm::Sha512_224,
        Algorithm::Sha512_256,
        Algorithm::Sha3_224,
        Algorithm::Sha3_256,
        Algorithm::Sha3_384,
        Algorithm::Sha3_512,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "MD5",
            Algorithm::Sha1 => "SHA1",
            Algorithm::Sha224 => "SHA224",
            Algorithm::Sha256 => "SHA256",
            Algorithm::Sha384 => "SHA384",
            Algorithm::Sha512 => "SHA512",
            Algorithm::Sha512_224 => "SHA512_224",
            Algorithm::Sha512_256 => "SHA512_256",
            Algorithm::Sha3_224 => "SHA3_224",
            Algorithm::Sha3_256 => "SHA3_256",
            Algorithm::Sha3_384 => "SHA3_384",
            Algorithm::Sha3_512 => "SHA3_512",
        }
    }

    /// Hex signature of `body`, prefixed by `timestamp,` when one is given
    pub fn sign(&self, secret: &[u8], timestamp: Option<&str>, body: &[u8]) -> Result<String, SignatureError> {
        let tag = match self {
            Algorithm::Md5 => sign_with::<Hmac<Md5>>(secret, timestamp, body),
            Algorithm::Sha1 => sign_with::<Hmac<Sha1>>(secret, timestamp, body),
            Algorithm::Sha224 => sign_with::<Hmac<Sha224>>(secret, timestamp, body),
            Algorithm::Sha256 => sign_with::<Hmac<Sha256>>(secret, timestamp, body),
            Algorithm::Sha384 => sign_with::<Hmac<Sha384>>(secret, timestamp, body),
            Algorithm::Sha512 => sign_with::<Hmac<Sha512>>(secret, timestamp, body),
            Algorithm::Sha512_224 => sign_with::<Hmac<Sha512_224>>(secret, timestamp, body),
            Algorithm::Sha512_256 => sign_with::<Hmac<Sha512_256>>(secret, timestamp, body),
            Algorithm::Sha3_224 => sign_with::<Hmac<Sha3_224>>(secret, timestamp, body),
            Algorithm::Sha3_256 => sign_with::<Hmac<Sha3_256>>(secret, timestamp, body),
            Algorithm::Sha3_384 => sign_with::<Hmac<Sha3_384>>(secret, timestamp, body),
            Algorithm::Sha3_512 => sign_with::<Hmac<Sha3_512>>(secret, timestamp, body),
        }?;
        Ok(hex::encode(tag))
    }

    /// Constant-time check of `signature` against the expected tag
    fn verify(
        &self,
        secret: &[u8],
        timestamp: Option<&str>,
        body: &[u8],
        signature: &[u8],
    ) -> Result<(), SignatureError> {
        match self {
            Algorithm::Md5 => verify_with::<Hmac<Md5>>(secret, timestamp, body, signature),
            Algorithm::Sha1 => verify_with::<Hmac<Sha1>>(secret, timestamp, body, signature),
            Algorithm::Sha224 => verify_with::<Hmac<Sha224>>(secret, timestamp, body, signature),
            Algorithm::Sha256 => verify_with::<Hmac<Sha256>>(secret, timestamp, body, signature),
            Algorithm::Sha384 => verify_with::<Hmac<Sha384>>(secret, timestamp, body, signature),
            Algorithm::Sha512 => verify_with::<Hmac<Sha512>>(secret, timestamp, body, signature),
            Algorithm::Sha512_224 => verify_with::<Hmac<Sha512_224>>(secret, timestamp, body, signature),
            Algorithm::Sha512_256 => verify_with::<Hmac<Sha512_256>>(secret, timestamp, body, signature),
            Algorithm::Sha3_224 => verify_with::<Hmac<Sha3_224>>(secret, timestamp, body, signature),
            Algorithm::Sha3_256 => verify_with::<Hmac<Sha3_256>>(secret, timestamp, body, signature),
            Algorithm::Sha3_384 => verify_with::<Hmac<Sha3_384>>(secret, timestamp, body, signature),
            Algorithm::Sha3_512 => verify_with::<Hmac<Sha3_512>>(secret, timestamp, body, signature),
        }
    }
}

impl FromStr for Algorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let algorithm = match s.trim().to_ascii_uppercase().as_str() {
            "MD5" => Algorithm::Md5,
            "SHA1" | "SHA-1" => Algorithm::Sha1,
            "SHA224" | "SHA-224" => Algorithm::Sha224,
            "SHA256" | "SHA-256" => Algorithm::Sha256,
            "SHA384" | "SHA-384" => Algorithm::Sha384,
            "SHA512" | "SHA-512" => Algorithm::Sha512,
            "SHA512_224" | "SHA-512/224" => Algorithm::Sha512_224,
            "SHA512_256" | "SHA-512/256" => Algorithm::Sha512_256,
            "SHA3_224" | "SHA3-224" => Algorithm::Sha3_224,
            "SHA3_256" | "SHA3-256" => Algorithm::Sha3_256,
            "SHA3_384" | "SHA3-384" => Algorithm::Sha3_384,
            "SHA3_512" | "SHA3-512" => Algorithm::Sha3_512,
            _ => return Err(SignatureError::UnsupportedAlgorithm(s.to_string())),
        };
        Ok(algorithm)
    }
}

fn keyed<M: Mac + KeyInit>(secret: &[u8], timestamp: Option<&str>, body: &[u8]) -> Result<M, SignatureError> {
    let mut mac = <M as KeyInit>::new_from_slice(secret).map_err(|_| SignatureError::InvalidKey)?;
    if let Some(timestamp) = timestamp {
        mac.update(timestamp.as_bytes());
        mac.update(b",");
    }
    mac.update(body);
    Ok(mac)
}

fn sign_with<M: Mac + KeyInit>(secret: &[u8], timestamp: Option<&str>, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
    Ok(keyed::<M>(secret, timestamp, body)?.finalize().into_bytes().to_vec())
}

fn verify_with<M: Mac + KeyInit>(
    secret: &[u8],
    timestamp: Option<&str>,
    body: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    keyed::<M>(secret, timestamp, body)?
        .verify_slice(signature)
        .map_err(|_| SignatureError::Invalid)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Verifies callback signatures against one secret and algorithm
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    algorithm: Algorithm,
    secret: Vec<u8>,
    header: String,
    replay_protection: bool,
}

impl SignatureVerifier {
    pub fn new(config: &SignatureConfig) -> Result<Self, SignatureError> {
        Ok(Self {
            algorithm: config.hash.parse()?,
            secret: config.secret.as_bytes().to_vec(),
            header: config.header.clone(),
            replay_protection: config.replay_attacks,
        })
    }

    pub fn verify(&self, signal: &Signal) -> Result<(), SignatureError> {
        self.verify_at(signal, unix_now())
    }

    /// Verify as if the current Unix time were `now`
    pub fn verify_at(&self, signal: &Signal, now: i64) -> Result<(), SignatureError> {
        let signature_hex = signal
            .header(&self.header)
            .ok_or_else(|| SignatureError::Decode(format!("signature header '{}' is missing", self.header)))?;
        let signature = hex::decode(signature_hex.trim())
            .map_err(|e| SignatureError::Decode(format!("signature header '{}': {}", self.header, e)))?;

        let timestamp = if self.replay_protection {
            let raw = signal
                .header(TIMESTAMP_HEADER)
                .ok_or_else(|| SignatureError::Decode(format!("timestamp header '{}' is missing", TIMESTAMP_HEADER)))?;
            let parsed: i64 = raw
                .parse()
                .map_err(|e| SignatureError::Decode(format!("signature timestamp '{}': {}", raw, e)))?;

            // An age that overflows i64 is older than any window
            let expired = now
                .checked_sub(parsed)
                .map_or(true, |age| age > REPLAY_WINDOW_SECS);
            if expired {
                return Err(SignatureError::ReplayExpired {
                    timestamp: parsed,
                    window: REPLAY_WINDOW_SECS,
                });
            }
            Some(raw)
        } else {
            None
        };

        self.algorithm
            .verify(&self.secret, timestamp, &signal.body, &signature)
    }
}
