//! Cryptographic primitives for envelope and rules verification.
//!
//! Everything the trust boundary needs and nothing more:
//! - SHA-256 digests ([`sha256`], [`Sha256Digest`])
//! - P-256 public keys parsed from X.509 SubjectPublicKeyInfo PEM ([`PublicKey`])
//! - ECDSA-P256 signature verification over raw message bytes
//!
//! Signature bytes are accepted in exactly two encodings, each parsed
//! strictly: ASN.1 DER, or fixed-width 64-byte `r || s`. Anything else is
//! reported as an invalid signature, never a panic.

use once_cell::sync::Lazy;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fmt::Display;

/// Compute the SHA-256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// A 32-byte SHA-256 digest, carried on the wire as a lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sha256Digest(pub [u8; 32]);

impl Sha256Digest {
    /// Digest of the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Sha256Digest(sha256(bytes))
    }

    /// Parse a digest from 64 hex characters (case-insensitive).
    pub fn from_hex(s: &str) -> Result<Self, KeyParseError> {
        static DIGEST_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{64}$").expect("invalid digest regex"));
        if !DIGEST_REGEX.is_match(s) {
            return Err(KeyParseError::BadDigest(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| KeyParseError::BadDigest(s.len()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyParseError::BadDigest(s.len()))?;
        Ok(Sha256Digest(array))
    }
}

impl Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl Serialize for Sha256Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Sha256Digest::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Failure to interpret key or digest material supplied at configuration or
/// decode time.
#[derive(thiserror::Error, Debug)]
pub enum KeyParseError {
    /// The PEM block did not contain a valid P-256 SubjectPublicKeyInfo.
    #[error("invalid P-256 public key PEM: {0}")]
    BadPem(String),
    /// A hex digest string had the wrong shape ({0} characters).
    #[error("invalid SHA-256 hex digest ({0} characters)")]
    BadDigest(usize),
}

/// An ECDSA P-256 public key.
///
/// Constructed from X.509 SubjectPublicKeyInfo PEM at configuration time or
/// when decoding rule users; immutable and cheap to clone afterwards. Two
/// keys compare equal iff their curve points match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    key: VerifyingKey,
}

impl PublicKey {
    /// Parse a PEM-encoded X.509 SubjectPublicKeyInfo carrying a P-256 point.
    pub fn from_pem(pem: &str) -> Result<Self, KeyParseError> {
        let key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| KeyParseError::BadPem(e.to_string()))?;
        Ok(PublicKey { key })
    }

    /// Stable identity for the key: SHA-256 of the compressed SEC1 point.
    pub fn fingerprint(&self) -> Sha256Digest {
        Sha256Digest::of(self.key.to_encoded_point(true).as_bytes())
    }

    /// Verify `signature_bytes` over `message` under this key.
    ///
    /// The signature is decoded as strict ASN.1 DER, or as raw `r || s` when
    /// it is exactly 64 bytes. Malformed or non-verifying input returns
    /// `false`; there is no normalization across encodings.
    pub fn verify(&self, message: &[u8], signature_bytes: &[u8]) -> bool {
        let Some(signature) = decode_signature(signature_bytes) else {
            return false;
        };
        self.key.verify(message, &signature).is_ok()
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p256:{}", self.fingerprint())
    }
}

fn decode_signature(bytes: &[u8]) -> Option<Signature> {
    if let Ok(signature) = Signature::from_der(bytes) {
        return Some(signature);
    }
    if bytes.len() == 64 {
        return Signature::from_slice(bytes).ok();
    }
    None
}
