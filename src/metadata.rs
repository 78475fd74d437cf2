//! Tamper-evident extraction of request metadata.
//!
//! A transaction request carries `metadata.hash` (a SHA-256 bound by the
//! enclosing signatures) and `metadata.payload_as_string` (a JSON array of
//! `{key, value}` entries). Every sensitive field (source, destination,
//! currency, request id, amount) is extracted from `payload_as_string`
//! alone. The wire object also carries a structured sibling `payload` field;
//! it is deliberately not declared on [`RequestMetadata`], so it cannot be
//! consulted by this crate at all.
//!
//! Accessors are pure functions of `payload_as_string` and are total when
//! metadata is absent (see [`crate::types::SignRequest`]); the binding of
//! the string to the signed hash is checked separately via
//! [`RequestMetadata::verify_payload_hash`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::sha256;
use crate::error::MetadataError;

/// The metadata block of a transaction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Hex SHA-256 over the exact bytes of `payload_as_string`.
    #[serde(default)]
    pub hash: String,
    /// JSON array of `{key, value}` entries, serialized as a string so the
    /// signed hash has a stable preimage.
    #[serde(default)]
    pub payload_as_string: String,
}

/// One `{key, value}` entry of the metadata payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    #[serde(default)]
    pub value: Value,
}

/// Amount details of a transfer request. Numeric fields keep their decimal
/// string form to preserve arbitrary precision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Amount {
    pub value_from: String,
    pub value_to: String,
    pub rate: String,
    pub decimals: u32,
    pub currency_from: String,
    pub currency_to: String,
}

impl RequestMetadata {
    /// Parse `payload_as_string` into its entries. An empty string is an
    /// empty list; anything else must be a JSON array of `{key, value}`
    /// objects.
    pub fn parse_entries(&self) -> Result<Vec<Entry>, MetadataError> {
        if self.payload_as_string.is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&self.payload_as_string)
            .map_err(|e| MetadataError::NotAnEntryArray(e.to_string()))
    }

    /// Check that the signed hash covers `payload_as_string` exactly.
    pub fn verify_payload_hash(&self) -> Result<(), MetadataError> {
        let computed = hex::encode(sha256(self.payload_as_string.as_bytes()));
        if computed.eq_ignore_ascii_case(&self.hash) {
            Ok(())
        } else {
            Err(MetadataError::HashMismatch {
                expected: self.hash.clone(),
                computed,
            })
        }
    }

    /// `entries["source"].value.payload.address`, or empty when absent.
    pub fn source_address(&self) -> Result<String, MetadataError> {
        self.payload_address("source")
    }

    /// `entries["destination"].value.payload.address`, or empty when absent.
    pub fn destination_address(&self) -> Result<String, MetadataError> {
        self.payload_address("destination")
    }

    /// The bare-string `currency` entry, or empty when absent.
    pub fn currency(&self) -> Result<String, MetadataError> {
        Ok(self
            .entry_value("currency")?
            .and_then(|value| value.as_str().map(str::to_owned))
            .unwrap_or_default())
    }

    /// The `request_id` entry; tolerated as a JSON number or a numeric
    /// string. Zero when absent.
    pub fn request_id(&self) -> Result<u64, MetadataError> {
        match self.entry_value("request_id")? {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n.as_u64().ok_or_else(|| MetadataError::BadEntry {
                key: "request_id",
                detail: format!("not a non-negative integer: {n}"),
            }),
            Some(Value::String(s)) => s.parse().map_err(|_| MetadataError::BadEntry {
                key: "request_id",
                detail: format!("not a numeric string: {s:?}"),
            }),
            Some(other) => Err(MetadataError::BadEntry {
                key: "request_id",
                detail: format!("unexpected shape: {other}"),
            }),
        }
    }

    /// The `amount` entry, or `None` when absent.
    pub fn amount(&self) -> Result<Option<Amount>, MetadataError> {
        let Some(value) = self.entry_value("amount")? else {
            return Ok(None);
        };
        let object = value.as_object().ok_or_else(|| MetadataError::BadEntry {
            key: "amount",
            detail: "value is not an object".to_string(),
        })?;
        Ok(Some(Amount {
            value_from: decimal_string(object.get("valueFrom")),
            value_to: decimal_string(object.get("valueTo")),
            rate: decimal_string(object.get("rate")),
            decimals: integer(object.get("decimals"), "amount")?,
            currency_from: plain_string(object.get("currencyFrom")),
            currency_to: plain_string(object.get("currencyTo")),
        }))
    }

    fn entry_value(&self, key: &str) -> Result<Option<Value>, MetadataError> {
        Ok(self
            .parse_entries()?
            .into_iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.value))
    }

    fn payload_address(&self, key: &'static str) -> Result<String, MetadataError> {
        Ok(self
            .entry_value(key)?
            .as_ref()
            .and_then(|value| value.pointer("/payload/address"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned())
    }
}

/// Render a JSON number or numeric string as a decimal string, preserving
/// precision. Absent or non-numeric values collapse to empty.
fn decimal_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn plain_string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Parse an integer that may arrive as a JSON number or a string.
fn integer(value: Option<&Value>, key: &'static str) -> Result<u32, MetadataError> {
    match value {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => {
            n.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| MetadataError::BadEntry {
                    key,
                    detail: format!("decimals out of range: {n}"),
                })
        }
        Some(Value::String(s)) => s.parse().map_err(|_| MetadataError::BadEntry {
            key,
            detail: format!("decimals is not a numeric string: {s:?}"),
        }),
        Some(other) => Err(MetadataError::BadEntry {
            key,
            detail: format!("decimals has unexpected shape: {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BTC_PAYLOAD: &str = r#"[
        {"key":"currency","value":"BTC"},
        {"key":"request_id","value":12345},
        {"key":"amount","value":{"valueFrom":"1000000","valueTo":"10.5","rate":"0.00001","decimals":8,"currencyFrom":"BTC","currencyTo":"USD"}},
        {"key":"source","value":{"payload":{"address":"src_addr"}}},
        {"key":"destination","value":{"payload":{"address":"dst_addr"}}}
    ]"#;

    fn metadata(payload: &str) -> RequestMetadata {
        RequestMetadata {
            hash: hex::encode(sha256(payload.as_bytes())),
            payload_as_string: payload.to_owned(),
        }
    }

    #[test]
    fn extracts_btc_transfer_fields() {
        let metadata = metadata(BTC_PAYLOAD);
        assert_eq!(metadata.currency().unwrap(), "BTC");
        assert_eq!(metadata.request_id().unwrap(), 12345);
        assert_eq!(metadata.source_address().unwrap(), "src_addr");
        assert_eq!(metadata.destination_address().unwrap(), "dst_addr");
        let amount = metadata.amount().unwrap().unwrap();
        assert_eq!(amount.value_from, "1000000");
        assert_eq!(amount.value_to, "10.5");
        assert_eq!(amount.rate, "0.00001");
        assert_eq!(amount.decimals, 8);
        assert_eq!(amount.currency_from, "BTC");
        assert_eq!(amount.currency_to, "USD");
    }

    #[test]
    fn request_id_tolerates_string_form() {
        let metadata = metadata(r#"[{"key":"request_id","value":"6789"}]"#);
        assert_eq!(metadata.request_id().unwrap(), 6789);
    }

    #[test]
    fn decimals_tolerates_string_form() {
        let metadata = metadata(
            r#"[{"key":"amount","value":{"valueFrom":"1","decimals":"6"}}]"#,
        );
        assert_eq!(metadata.amount().unwrap().unwrap().decimals, 6);
    }

    #[test]
    fn empty_payload_is_an_empty_list() {
        let metadata = RequestMetadata::default();
        assert!(metadata.parse_entries().unwrap().is_empty());
        assert_eq!(metadata.source_address().unwrap(), "");
        assert_eq!(metadata.currency().unwrap(), "");
        assert_eq!(metadata.request_id().unwrap(), 0);
        assert_eq!(metadata.amount().unwrap(), None);
    }

    #[test]
    fn non_array_payload_is_an_error() {
        let metadata = RequestMetadata {
            hash: String::new(),
            payload_as_string: r#"{"key":"currency"}"#.to_owned(),
        };
        assert!(matches!(
            metadata.parse_entries(),
            Err(MetadataError::NotAnEntryArray(_))
        ));
    }

    #[test]
    fn missing_paths_yield_empty_strings() {
        let metadata = metadata(r#"[{"key":"source","value":{"payload":{}}}]"#);
        assert_eq!(metadata.source_address().unwrap(), "");
        assert_eq!(metadata.destination_address().unwrap(), "");
    }

    #[test]
    fn hash_binding_accepts_exact_payload() {
        let metadata = metadata(BTC_PAYLOAD);
        assert!(metadata.verify_payload_hash().is_ok());
    }

    #[test]
    fn hash_binding_rejects_modified_payload() {
        let mut metadata = metadata(BTC_PAYLOAD);
        metadata.payload_as_string = metadata.payload_as_string.replace("dst_addr", "evil_addr");
        assert!(matches!(
            metadata.verify_payload_hash(),
            Err(MetadataError::HashMismatch { .. })
        ));
    }

    #[test]
    fn structured_sibling_payload_is_not_even_deserialized() {
        // A wire object with a structured `payload` sibling: the field does
        // not exist on RequestMetadata, so nothing in this crate can read it.
        let wire = r#"{
            "hash": "00",
            "payload_as_string": "",
            "payload": [{"key":"destination","value":{"payload":{"address":"evil"}}}]
        }"#;
        let metadata: RequestMetadata = serde_json::from_str(wire).unwrap();
        assert_eq!(metadata.destination_address().unwrap(), "");
    }
}
