//! Wire DTOs consumed by the client façade.
//!
//! These mirror the server's JSON shapes. Status and action strings include
//! legacy values from retired networks, so the status enum keeps an
//! `Unknown` fallback instead of failing deserialization; no verification
//! decision depends on it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Display;

use crate::error::MetadataError;
use crate::metadata::{Amount, RequestMetadata};
use crate::util::Base64Bytes;

/// Lifecycle status of a transaction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestStatus {
    Created,
    Approved,
    Rejected,
    Signed,
    Broadcast,
    Confirmed,
    Failed,
    Canceled,
    /// Any status string this client version does not recognize, including
    /// legacy values. Preserved verbatim.
    Unknown(String),
}

impl RequestStatus {
    fn from_wire(value: &str) -> RequestStatus {
        match value {
            "CREATED" => RequestStatus::Created,
            "APPROVED" => RequestStatus::Approved,
            "REJECTED" => RequestStatus::Rejected,
            "SIGNED" => RequestStatus::Signed,
            "BROADCAST" => RequestStatus::Broadcast,
            "CONFIRMED" => RequestStatus::Confirmed,
            "FAILED" => RequestStatus::Failed,
            "CANCELED" => RequestStatus::Canceled,
            other => RequestStatus::Unknown(other.to_owned()),
        }
    }

    fn as_wire(&self) -> &str {
        match self {
            RequestStatus::Created => "CREATED",
            RequestStatus::Approved => "APPROVED",
            RequestStatus::Rejected => "REJECTED",
            RequestStatus::Signed => "SIGNED",
            RequestStatus::Broadcast => "BROADCAST",
            RequestStatus::Confirmed => "CONFIRMED",
            RequestStatus::Failed => "FAILED",
            RequestStatus::Canceled => "CANCELED",
            RequestStatus::Unknown(value) => value,
        }
    }
}

impl Default for RequestStatus {
    fn default() -> Self {
        RequestStatus::Unknown(String::new())
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_wire())
    }
}

impl Serialize for RequestStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire())
    }
}

impl<'de> Deserialize<'de> for RequestStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(RequestStatus::from_wire(&s))
    }
}

/// A transaction request as returned by `GET /requests/{id}`.
///
/// Sensitive fields are never read from the request body directly; they come
/// out of the hash-bound metadata string via the accessors below, which are
/// total when metadata is absent.
#[derive(Debug, Clone, Deserialize)]
pub struct SignRequest {
    pub id: String,
    #[serde(default)]
    pub status: RequestStatus,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub wallet_id: String,
    #[serde(default)]
    pub metadata: Option<RequestMetadata>,
}

impl SignRequest {
    pub fn source_address(&self) -> Result<String, MetadataError> {
        match &self.metadata {
            None => Ok(String::new()),
            Some(metadata) => metadata.source_address(),
        }
    }

    pub fn destination_address(&self) -> Result<String, MetadataError> {
        match &self.metadata {
            None => Ok(String::new()),
            Some(metadata) => metadata.destination_address(),
        }
    }

    pub fn currency(&self) -> Result<String, MetadataError> {
        match &self.metadata {
            None => Ok(String::new()),
            Some(metadata) => metadata.currency(),
        }
    }

    pub fn request_id(&self) -> Result<u64, MetadataError> {
        match &self.metadata {
            None => Ok(0),
            Some(metadata) => metadata.request_id(),
        }
    }

    pub fn amount(&self) -> Result<Option<Amount>, MetadataError> {
        match &self.metadata {
            None => Ok(None),
            Some(metadata) => metadata.amount(),
        }
    }
}

/// The current governance ruleset as returned by `GET /governance/rules`.
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceRules {
    pub rules_container: Base64Bytes,
    pub rules_signatures: Base64Bytes,
}

/// One SuperAdmin key listing entry from `GET /governance/public_keys`.
#[derive(Debug, Clone, Deserialize)]
pub struct SuperAdminKeyEntry {
    pub user_id: String,
    pub public_key_pem: String,
}

/// Error body some failing responses carry.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sha256;

    #[test]
    fn known_status_round_trips() {
        let status: RequestStatus = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(status, RequestStatus::Approved);
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"APPROVED\"");
    }

    #[test]
    fn legacy_status_falls_back_to_unknown() {
        let status: RequestStatus = serde_json::from_str("\"DIEM_PAYMENT\"").unwrap();
        assert_eq!(status, RequestStatus::Unknown("DIEM_PAYMENT".into()));
        assert_eq!(status.to_string(), "DIEM_PAYMENT");
    }

    #[test]
    fn request_accessors_are_total_without_metadata() {
        let request: SignRequest = serde_json::from_str(r#"{"id": "req-1"}"#).unwrap();
        assert_eq!(request.source_address().unwrap(), "");
        assert_eq!(request.destination_address().unwrap(), "");
        assert_eq!(request.currency().unwrap(), "");
        assert_eq!(request.request_id().unwrap(), 0);
        assert_eq!(request.amount().unwrap(), None);
    }

    #[test]
    fn request_accessors_read_only_the_metadata_string() {
        let payload = r#"[{"key":"destination","value":{"payload":{"address":"dst"}}}]"#;
        let request: SignRequest = serde_json::from_value(serde_json::json!({
            "id": "req-1",
            "status": "APPROVED",
            // A structured destination elsewhere in the DTO must not leak
            // into the accessors.
            "destination": {"address": "evil"},
            "metadata": {
                "hash": hex::encode(sha256(payload.as_bytes())),
                "payload_as_string": payload
            }
        }))
        .unwrap();
        assert_eq!(request.destination_address().unwrap(), "dst");
    }
}
