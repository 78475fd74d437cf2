use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;

/// Raw bytes that travel on the wire as a standard-base64 string.
///
/// Envelope DTOs carry their binary fields (`rules_container`,
/// `rules_signatures`, payload bytes, signatures) base64-encoded inside JSON;
/// this wrapper decodes them at deserialization time so the rest of the crate
/// only ever sees raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decode a base64 string into raw bytes.
    pub fn decode<T: AsRef<[u8]>>(input: T) -> Result<Self, base64::DecodeError> {
        b64.decode(input.as_ref()).map(Base64Bytes)
    }

    /// Encode raw bytes into their base64 string form.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> String {
        b64.encode(input.as_ref())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for Base64Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64Bytes {
    fn from(bytes: Vec<u8>) -> Self {
        Base64Bytes(bytes)
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Self::encode(&self.0))
    }
}

impl Serialize for Base64Bytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&Self::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Bytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Base64Bytes::decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
