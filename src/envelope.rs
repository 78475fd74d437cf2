//! Signed envelopes for whitelisted addresses and whitelisted assets.
//!
//! An envelope bundles the server's JSON view of a whitelisting entry with
//! everything needed to verify it client-side: the raw signed payload bytes,
//! the per-user signatures over them, and the rules context (container +
//! SuperAdmin signatures). It is constructed unverified; the pipeline in
//! [`crate::verifier`] transitions it to verified exactly once, after which
//! [`Envelope::verified`] returns the parsed, trusted view.

use serde::Deserialize;
use std::sync::{Arc, OnceLock};

use crate::codec::{CodecError, Reader, WireType, Writer};
use crate::error::WhitelistError;
use crate::metadata::RequestMetadata;
use crate::rules::{Blockchain, RulesContainer, SequentialThresholds, wildcard};
use crate::resolver::{resolve_address_rule, resolve_contract_rule};
use crate::util::Base64Bytes;

/// The signed payload block of an envelope: raw bytes plus the signatures
/// the server collected over them.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedPayload {
    pub payload: Base64Bytes,
    #[serde(default)]
    pub signatures: Vec<SignatureEntry>,
}

/// One collected signature together with the payload hashes it covers.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureEntry {
    pub user_signature: UserSignatureDto,
    #[serde(default)]
    pub hashes: Vec<String>,
}

impl SignatureEntry {
    /// Whether this entry covers the given hex digest.
    pub fn covers(&self, digest_hex: &str) -> bool {
        self.hashes
            .iter()
            .any(|hash| hash.eq_ignore_ascii_case(digest_hex))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserSignatureDto {
    pub user_id: String,
    pub signature: Base64Bytes,
    #[serde(default)]
    pub comment: String,
}

/// Approval requirements as the server displays them. Informational; the
/// verifier derives the binding policy from the verified rules container.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Approvers {
    #[serde(default)]
    pub parallel: Vec<ParallelGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParallelGroup {
    #[serde(default)]
    pub sequential: Vec<SequentialStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SequentialStep {
    pub external_group_id: String,
    pub minimum_signatures: u32,
}

/// The verified view published onto an envelope: the parsed payload and the
/// rules container it was verified against.
#[derive(Debug)]
pub struct Verified<P> {
    pub payload: P,
    pub rules: Arc<RulesContainer>,
}

/// A payload kind that can ride in an envelope.
///
/// The verification pipeline is generic over this seam: parsing the signed
/// bytes, cross-checking them against the outer envelope, and picking the
/// applicable approval thresholds differ between addresses and assets;
/// everything else is shared.
pub trait VerifiedPayload: Sized {
    /// Decode the signed payload bytes.
    fn parse(bytes: &[u8]) -> Result<Self, CodecError>;

    /// Cross-check the parsed payload against the envelope it arrived in.
    fn check_envelope(&self, blockchain: &str, network: &str) -> Result<(), WhitelistError>;

    /// The approval thresholds applicable to this payload kind for the
    /// envelope's `(blockchain, network)`.
    fn resolve_thresholds<'a>(
        container: &'a RulesContainer,
        blockchain: &str,
        network: &str,
    ) -> Option<&'a [SequentialThresholds]>;
}

/// A server envelope around a signed payload of kind `P`.
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = ""))]
pub struct Envelope<P: VerifiedPayload> {
    pub id: String,
    #[serde(default)]
    pub blockchain: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub metadata: Option<RequestMetadata>,
    /// The signed payload block; `signed_address` on address envelopes,
    /// `signed_contract_address` on asset envelopes.
    #[serde(alias = "signed_address", alias = "signed_contract_address")]
    pub signed_payload: SignedPayload,
    pub rules_container: Base64Bytes,
    pub rules_signatures: Base64Bytes,
    #[serde(default)]
    pub approvers: Option<Approvers>,
    #[serde(skip)]
    verified: OnceLock<Verified<P>>,
}

impl<P: VerifiedPayload> Envelope<P> {
    /// The verified view, or `None` before verification has succeeded.
    pub fn verified(&self) -> Option<&Verified<P>> {
        self.verified.get()
    }

    /// Publish the verified view. Write-once: a second publication is
    /// ignored and the first view is returned.
    pub(crate) fn publish(&self, verified: Verified<P>) -> &Verified<P> {
        self.verified.get_or_init(|| verified)
    }
}

/// A whitelisted destination address, parsed from verified payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistedAddress {
    /// Canonical blockchain tag (`ETH`, `BTC`, ...).
    pub blockchain: String,
    /// Absent when the applicable rule does not include the network in the
    /// signed payload.
    pub network: Option<String>,
    pub address: String,
    pub label: String,
    pub memo: Option<String>,
    pub address_type: String,
}

impl WhitelistedAddress {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.varint_field(1, blockchain_code(&self.blockchain));
        if let Some(network) = &self.network {
            writer.string_field(2, network);
        }
        writer.string_field(3, &self.address);
        writer.string_field(4, &self.label);
        if let Some(memo) = &self.memo {
            writer.string_field(5, memo);
        }
        writer.string_field(6, &self.address_type);
        writer.finish()
    }
}

impl VerifiedPayload for WhitelistedAddress {
    fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        const MSG: &str = "WhitelistedAddress";
        let mut blockchain = None;
        let mut network = None;
        let mut address = None;
        let mut label = String::new();
        let mut memo = None;
        let mut address_type = String::new();
        let mut reader = Reader::new(bytes);
        while !reader.is_at_end() {
            let (tag, wire) = reader.read_key(MSG)?;
            match (tag, wire) {
                (1, WireType::Varint) => {
                    blockchain = Some(Blockchain::from_code(reader.read_varint(MSG)?))
                }
                (2, WireType::Len) => network = wildcard(reader.read_string(MSG)?),
                (3, WireType::Len) => address = Some(reader.read_string(MSG)?),
                (4, WireType::Len) => label = reader.read_string(MSG)?,
                (5, WireType::Len) => memo = Some(reader.read_string(MSG)?),
                (6, WireType::Len) => address_type = reader.read_string(MSG)?,
                (tag @ 1..=6, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
                (_, wire) => reader.skip(wire, MSG)?,
            }
        }
        Ok(WhitelistedAddress {
            blockchain: blockchain
                .ok_or(CodecError::missing(MSG, "blockchain"))?
                .to_string(),
            network,
            address: address.ok_or(CodecError::missing(MSG, "address"))?,
            label,
            memo,
            address_type,
        })
    }

    fn check_envelope(&self, blockchain: &str, network: &str) -> Result<(), WhitelistError> {
        if self.blockchain != blockchain {
            return Err(WhitelistError::MismatchedBlockchain {
                payload: self.blockchain.clone(),
                envelope: blockchain.to_owned(),
            });
        }
        // The network is only present in the payload when the applicable
        // rule says to include it; absence is fine, a different value is not.
        if let Some(payload_network) = &self.network {
            if payload_network != network {
                return Err(WhitelistError::MismatchedBlockchain {
                    payload: format!("{}/{payload_network}", self.blockchain),
                    envelope: format!("{blockchain}/{network}"),
                });
            }
        }
        Ok(())
    }

    fn resolve_thresholds<'a>(
        container: &'a RulesContainer,
        blockchain: &str,
        network: &str,
    ) -> Option<&'a [SequentialThresholds]> {
        resolve_address_rule(&container.address_rules, blockchain, network)
            .map(|rule| rule.parallel_thresholds.as_slice())
    }
}

/// A whitelisted contract/token asset, parsed from verified payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistedAsset {
    /// Canonical blockchain tag (`ETH`, `BTC`, ...).
    pub blockchain: String,
    pub network: String,
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
    pub contract_address: String,
    pub token_id: Option<String>,
    pub kind: String,
}

impl WhitelistedAsset {
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.varint_field(1, blockchain_code(&self.blockchain));
        writer.string_field(2, &self.network);
        writer.string_field(3, &self.name);
        writer.string_field(4, &self.symbol);
        writer.varint_field(5, u64::from(self.decimals));
        writer.string_field(6, &self.contract_address);
        if let Some(token_id) = &self.token_id {
            writer.string_field(7, token_id);
        }
        writer.string_field(8, &self.kind);
        writer.finish()
    }
}

impl VerifiedPayload for WhitelistedAsset {
    fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        const MSG: &str = "WhitelistedAsset";
        let mut blockchain = None;
        let mut network = String::new();
        let mut name = String::new();
        let mut symbol = String::new();
        let mut decimals = 0u32;
        let mut contract_address = None;
        let mut token_id = None;
        let mut kind = String::new();
        let mut reader = Reader::new(bytes);
        while !reader.is_at_end() {
            let (tag, wire) = reader.read_key(MSG)?;
            match (tag, wire) {
                (1, WireType::Varint) => {
                    blockchain = Some(Blockchain::from_code(reader.read_varint(MSG)?))
                }
                (2, WireType::Len) => network = reader.read_string(MSG)?,
                (3, WireType::Len) => name = reader.read_string(MSG)?,
                (4, WireType::Len) => symbol = reader.read_string(MSG)?,
                (5, WireType::Varint) => decimals = reader.read_varint(MSG)? as u32,
                (6, WireType::Len) => contract_address = Some(reader.read_string(MSG)?),
                (7, WireType::Len) => token_id = Some(reader.read_string(MSG)?),
                (8, WireType::Len) => kind = reader.read_string(MSG)?,
                (tag @ 1..=8, wire) => return Err(CodecError::unexpected(MSG, tag, wire)),
                (_, wire) => reader.skip(wire, MSG)?,
            }
        }
        Ok(WhitelistedAsset {
            blockchain: blockchain
                .ok_or(CodecError::missing(MSG, "blockchain"))?
                .to_string(),
            network,
            name,
            symbol,
            decimals,
            contract_address: contract_address
                .ok_or(CodecError::missing(MSG, "contract_address"))?,
            token_id,
            kind,
        })
    }

    fn check_envelope(&self, _blockchain: &str, _network: &str) -> Result<(), WhitelistError> {
        Ok(())
    }

    fn resolve_thresholds<'a>(
        container: &'a RulesContainer,
        blockchain: &str,
        network: &str,
    ) -> Option<&'a [SequentialThresholds]> {
        resolve_contract_rule(&container.contract_rules, blockchain, network)
            .map(|rule| rule.parallel_thresholds.as_slice())
    }
}

fn blockchain_code(tag: &str) -> u64 {
    match tag {
        "ETH" => Blockchain::Eth.code(),
        "BTC" => Blockchain::Btc.code(),
        "XTZ" => Blockchain::Xtz.code(),
        "ALGO" => Blockchain::Algo.code(),
        "DOT" => Blockchain::Dot.code(),
        "SOL" => Blockchain::Sol.code(),
        _ => 0,
    }
}
